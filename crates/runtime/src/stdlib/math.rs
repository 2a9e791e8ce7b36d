//! The `math` importable library (spec §6).
//!
//! Function list and the `PI` constant are grounded in the original's
//! `Library::Math` (`original_source/src/Libraries/Math.cpp`), trimmed to
//! the operations most wisp programs would reach for; the rest (asinh,
//! atanh, cbrt, expm1, log1p, signbit, ...) are dropped rather than
//! translated one-for-one, noted in DESIGN.md.

use super::{arity_error, expect_number, Globals};
use crate::native::native;
use std::f64::consts::PI;

pub fn install(globals: &Globals) {
    let mut g = globals.borrow_mut();

    macro_rules! unary {
        ($name:literal, $f:expr) => {
            g.insert(
                $name.into(),
                native($name, Some(1), |args| match expect_number(args, 0, $name) {
                    Ok(x) => wisp_core::Value::Number(($f)(x)),
                    Err(v) => v,
                }),
            );
        };
    }

    unary!("abs", f64::abs);
    unary!("sqrt", f64::sqrt);
    unary!("floor", f64::floor);
    unary!("ceil", f64::ceil);
    unary!("round", f64::round);
    unary!("sin", f64::sin);
    unary!("cos", f64::cos);
    unary!("tan", f64::tan);
    unary!("exp", f64::exp);
    unary!("log", f64::ln);
    unary!("log10", f64::log10);
    unary!("log2", f64::log2);

    g.insert(
        "pow".into(),
        native("pow", Some(2), |args| {
            match (expect_number(args, 0, "pow"), expect_number(args, 1, "pow")) {
                (Ok(base), Ok(exp)) => wisp_core::Value::Number(base.powf(exp)),
                (Err(v), _) | (_, Err(v)) => v,
            }
        }),
    );

    g.insert(
        "hypot".into(),
        native("hypot", Some(2), |args| {
            match (expect_number(args, 0, "hypot"), expect_number(args, 1, "hypot")) {
                (Ok(a), Ok(b)) => wisp_core::Value::Number(a.hypot(b)),
                (Err(v), _) | (_, Err(v)) => v,
            }
        }),
    );

    g.insert(
        "max".into(),
        native("max", None, |args| reduce(args, "max", f64::max)),
    );
    g.insert(
        "min".into(),
        native("min", None, |args| reduce(args, "min", f64::min)),
    );
    g.insert(
        "sum".into(),
        native("sum", None, |args| {
            if args.is_empty() {
                return arity_error("sum", "at least 1 argument", 0);
            }
            let mut total = 0.0;
            for (i, _) in args.iter().enumerate() {
                match expect_number(args, i, "sum") {
                    Ok(n) => total += n,
                    Err(v) => return v,
                }
            }
            wisp_core::Value::Number(total)
        }),
    );

    g.insert("PI".into(), wisp_core::Value::Number(PI));
}

fn reduce(args: &[wisp_core::Value], name: &str, f: impl Fn(f64, f64) -> f64) -> wisp_core::Value {
    if args.is_empty() {
        return arity_error(name, "at least 1 argument", 0);
    }
    let mut acc = match expect_number(args, 0, name) {
        Ok(n) => n,
        Err(v) => return v,
    };
    for i in 1..args.len() {
        match expect_number(args, i, name) {
            Ok(n) => acc = f(acc, n),
            Err(v) => return v,
        }
    }
    wisp_core::Value::Number(acc)
}
