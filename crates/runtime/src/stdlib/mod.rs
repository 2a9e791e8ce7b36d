//! Native-function registry: the unconditional builtins plus the
//! importable libraries (spec §6).
//!
//! `import` needs to mutate the globals table from inside a `NativeFn`
//! closure, but `wisp_core::NativeFn` is deliberately just
//! `Fn(&[Value]) -> Value` — it has no handle back to the VM. The
//! original works around the same problem by capturing `this` in a
//! C++ lambda (`virtual_machine.hpp`'s `import_lib`); the Rust analogue is
//! to give natives that need it a clone of the VM's globals map, shared
//! via `Rc<RefCell<..>>` rather than a `this` pointer.

mod array;
mod cstdio;
mod math;
mod stdio;

use crate::native::{native, native_error};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;
use wisp_core::Value;

pub type Globals = Rc<RefCell<HashMap<Rc<str>, Value>>>;

fn expect_number(args: &[Value], index: usize, fn_name: &str) -> Result<f64, Value> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        Some(_) => Err(native_error(fn_name, "operand must be a number")),
        None => Err(arity_error(fn_name, "another argument", args.len())),
    }
}

fn expect_string(args: &[Value], index: usize, fn_name: &str) -> Result<Rc<str>, Value> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(native_error(fn_name, "operand must be a string")),
        None => Err(arity_error(fn_name, "another argument", args.len())),
    }
}

fn arity_error(fn_name: &str, expected: &str, got: usize) -> Value {
    native_error(fn_name, &format!("expects {expected}. Got {got}."))
}

/// Populate the globals table with the builtins every program gets without
/// an explicit `import`: `clock`, `date`, `version`, `exit`, `string`,
/// `import` (spec §6).
pub fn install_builtins(globals: &Globals) {
    let start = Instant::now();
    let mut g = globals.borrow_mut();

    g.insert(
        "clock".into(),
        native("clock", Some(0), move |_| Value::Number(start.elapsed().as_secs_f64())),
    );

    g.insert(
        "date".into(),
        native("date", Some(0), |_| Value::String(Rc::from(format_date_now().as_str()))),
    );

    g.insert(
        "version".into(),
        native("version", Some(0), |_| {
            println!("wisp 0.1.0");
            Value::String(Rc::from("wisp 0.1.0"))
        }),
    );

    g.insert(
        "exit".into(),
        native("exit", Some(0), |_| {
            println!("Bye...");
            std::process::exit(0);
        }),
    );

    g.insert(
        "string".into(),
        native("string", Some(1), |args| match args.first() {
            Some(v) => Value::String(Rc::from(v.display().as_str())),
            None => arity_error("string", "1 argument", 0),
        }),
    );

    let importable = globals.clone();
    g.insert(
        "import".into(),
        native("import", Some(1), move |args| {
            let name = match expect_string(args, 0, "import") {
                Ok(n) => n,
                Err(v) => return v,
            };
            match name.as_ref() {
                "math" => {
                    math::install(&importable);
                    Value::Bool(true)
                }
                "stdio" => {
                    stdio::install(&importable);
                    Value::Bool(true)
                }
                "cstdio" => {
                    cstdio::install(&importable);
                    Value::Bool(true)
                }
                "array" => {
                    array::install(&importable);
                    Value::Bool(true)
                }
                other => native_error("import", &format!("library '{other}' does not exist.")),
            }
        }),
    );
}

/// Render the current local time as `DD/MM/YY, HH:MM:SS`, matching the
/// `strftime` format the original's `native_date` uses. No `chrono`
/// dependency: civil-from-days is a handful of integer operations, done
/// here in UTC since the teacher's stack carries nothing for timezone
/// lookup either.
fn format_date_now() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let (days, secs_of_day) = (secs / 86400, secs % 86400);
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{day:02}/{month:02}/{:02}, {hour:02}:{minute:02}:{second:02}",
        year % 100
    )
}

/// Howard Hinnant's days-from-civil algorithm, run in reverse. Avoids a
/// calendar-library dependency for something that's ~15 lines of integer
/// math.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_unconditional_builtins() {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install_builtins(&globals);
        for name in ["clock", "date", "version", "exit", "string", "import"] {
            assert!(globals.borrow().contains_key(name), "missing builtin {name}");
        }
    }

    #[test]
    fn import_registers_library_functions() {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install_builtins(&globals);
        let import_fn = globals.borrow().get("import").cloned().unwrap();
        if let Value::NativeFunction(f) = import_fn {
            let result = (f.func)(&[Value::String(Rc::from("math"))]);
            assert_eq!(result, Value::Bool(true));
        } else {
            panic!("import should be a native function");
        }
        assert!(globals.borrow().contains_key("sqrt"));
        assert!(globals.borrow().contains_key("PI"));
    }

    #[test]
    fn import_unknown_library_returns_false_like_value() {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install_builtins(&globals);
        let import_fn = globals.borrow().get("import").cloned().unwrap();
        if let Value::NativeFunction(f) = import_fn {
            let result = (f.func)(&[Value::String(Rc::from("nope"))]);
            assert_eq!(result, Value::Null);
        } else {
            panic!("import should be a native function");
        }
    }

    #[test]
    fn civil_from_days_epoch_is_1970_01_01() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }
}
