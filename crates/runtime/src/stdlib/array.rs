//! The `array` importable library: `push`, `pop`, `len`.
//!
//! Grounded in `original_source/src/stdlib/array.cpp`. The original's
//! `push`/`pop` both require `argc >= 2` and return `*(args + 1)` even when
//! popping (so `pop(array)` with no second argument is unreachable and
//! `pop` never actually returns the popped element) — not reproduced; this
//! treats the return-value bug as a defect rather than behavior to copy
//! (DESIGN.md), the same call made for the `BwNot`-fallthrough and
//! array-bounds issues `SPEC_FULL.md`'s Open Question resolutions fix.

use super::Globals;
use crate::native::{native, native_error};
use wisp_core::Value;

pub fn install(globals: &Globals) {
    let mut g = globals.borrow_mut();

    g.insert(
        "push".into(),
        native("push", None, |args| match args.first() {
            Some(Value::Array(array)) if args.len() >= 2 => {
                array.borrow_mut().extend(args[1..].iter().cloned());
                Value::Array(array.clone())
            }
            Some(Value::Array(_)) => native_error("push", "expects at least 2 arguments"),
            _ => native_error("push", "expected type is array"),
        }),
    );

    g.insert(
        "pop".into(),
        native("pop", Some(1), |args| match args.first() {
            Some(Value::Array(array)) => match array.borrow_mut().pop() {
                Some(v) => v,
                None => native_error("pop", "array is empty"),
            },
            _ => native_error("pop", "expected type is array"),
        }),
    );

    g.insert(
        "len".into(),
        native("len", Some(1), |args| match args.first() {
            Some(Value::Array(array)) => Value::Number(array.borrow().len() as f64),
            Some(Value::String(s)) => Value::Number(s.chars().count() as f64),
            _ => native_error("len", "expected type is array or string"),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    fn call(globals: &Globals, name: &str, args: &[Value]) -> Value {
        let Value::NativeFunction(f) = globals.borrow().get(name).cloned().unwrap() else {
            panic!("{name} should be native")
        };
        (f.func)(args)
    }

    #[test]
    fn push_pop_and_len_roundtrip() {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install(&globals);

        let array = Value::Array(Rc::new(RefCell::new(vec![Value::Number(1.0)])));
        call(&globals, "push", &[array.clone(), Value::Number(2.0)]);
        assert_eq!(call(&globals, "len", &[array.clone()]), Value::Number(2.0));

        let popped = call(&globals, "pop", &[array.clone()]);
        assert_eq!(popped, Value::Number(2.0));
        assert_eq!(call(&globals, "len", &[array]), Value::Number(1.0));
    }
}
