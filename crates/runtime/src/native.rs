//! Bridge between Rust closures and the language's native-function Value.
//!
//! `wisp_core::NativeFn` is `Rc<dyn Fn(&[Value]) -> Value>` — the slice IS
//! the `(argc, args)` pair the spec describes (its length is argc), which
//! is the idiomatic Rust shape for "an iterator over Value" bounded by a
//! known count. Errors are reported per spec §6 ("printing a diagnostic and
//! returning Null") rather than threaded back through `Result`, since the
//! VM's `Call` dispatch has nowhere to route a native failure except the
//! same Value channel every other call returns through.

use std::rc::Rc;
use wisp_core::{NativeFunctionObj, Value};

/// Wrap a Rust closure as a callable `Value::NativeFunction`.
///
/// `arity` is `None` for variadic natives (e.g. `string`, which accepts
/// exactly one argument but whose arity check the closure itself performs
/// so it can report a native-flavored diagnostic instead of the VM's
/// generic arity-mismatch message).
pub fn native(name: &str, arity: Option<u8>, func: impl Fn(&[Value]) -> Value + 'static) -> Value {
    Value::NativeFunction(NativeFunctionObj {
        name: Rc::from(name),
        arity,
        func: Rc::new(func) as Rc<dyn Fn(&[Value]) -> Value>,
    })
}

/// Print a native-function diagnostic to stderr in the same shape the VM
/// uses for runtime errors, then return `Null` — the contract every
/// builtin and library function follows on a bad argument.
pub fn native_error(name: &str, message: &str) -> Value {
    eprintln!("native fn '{name}': {message}");
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_a_closure_as_a_callable_value() {
        let v = native("double", Some(1), |args| match args.first() {
            Some(Value::Number(n)) => Value::Number(n * 2.0),
            _ => native_error("double", "expected a number"),
        });
        match v {
            Value::NativeFunction(f) => {
                assert_eq!((f.func)(&[Value::Number(3.0)]), Value::Number(6.0));
            }
            _ => panic!("expected NativeFunction"),
        }
    }
}
