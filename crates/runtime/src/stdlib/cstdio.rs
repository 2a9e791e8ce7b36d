//! The `cstdio` importable library: thin wrappers over `puts`/`putchar`.
//!
//! Grounded in `original_source/src/stdlib/cstdio.cpp`. The original's
//! `putc(char, stream)` writes to an arbitrary `FILE*`; wisp's `stdio`
//! library already exposes real files as `Value::File`, so `putc` here
//! is dropped in favor of always targeting stdout — a narrower, simpler
//! surface than the C original's raw-stream plumbing (noted in DESIGN.md).

use super::{expect_string, Globals};
use crate::native::{native, native_error};
use std::io::Write;
use wisp_core::Value;

pub fn install(globals: &Globals) {
    let mut g = globals.borrow_mut();

    g.insert(
        "puts".into(),
        native("puts", Some(1), |args| match expect_string(args, 0, "puts") {
            Ok(s) => {
                println!("{s}");
                Value::Number(0.0)
            }
            Err(v) => v,
        }),
    );

    g.insert(
        "putchar".into(),
        native("putchar", Some(1), |args| match expect_string(args, 0, "putchar") {
            Ok(s) if s.chars().count() == 1 => {
                print!("{s}");
                let _ = std::io::stdout().flush();
                Value::Number(s.chars().next().unwrap() as u32 as f64)
            }
            Ok(_) => native_error("putchar", "expects a single char argument"),
            Err(v) => v,
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[test]
    fn installs_puts_and_putchar() {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install(&globals);
        assert!(globals.borrow().contains_key("puts"));
        assert!(globals.borrow().contains_key("putchar"));
    }
}
