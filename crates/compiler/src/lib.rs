//! Tokenizer, single-pass Pratt parser and code generator for wisp.
//!
//! There is no AST: `parser::compile` scans and parses the source once,
//! emitting bytecode directly into the function being compiled, in the
//! style of a textbook single-pass compiler rather than the teacher's
//! parse-then-lower-to-LLVM pipeline (see `SPEC_FULL.md` §1).

mod compiler;
mod scanner;
mod parser;

pub use parser::compile;
pub use scanner::{Scanner, Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_error_on_a_multi_error_program() {
        let errs = compile("var 1 = 2; class A < A {}").unwrap_err();
        assert!(errs.len() >= 2);
    }

    #[test]
    fn compiles_print_and_control_flow() {
        assert!(compile("if (1 < 2) { print \"yes\"; } else { print \"no\"; }").is_ok());
        assert!(compile("var i = 0; while (i < 3) { print i; i = i + 1; }").is_ok());
        assert!(compile("for (var i = 0; i < 3; i = i + 1) { print i; }").is_ok());
    }

    #[test]
    fn compiles_arrays() {
        assert!(compile("var a = [1, 2, 3]; a[0] = a[1]; print a[0];").is_ok());
    }
}
