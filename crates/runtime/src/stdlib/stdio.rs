//! The `stdio` importable library: console input and buffered file I/O.
//!
//! Grounded in `original_source/src/Libraries/StdIO.cpp`'s `read`/`fopen`/
//! `fclose`/`fflush`/`fread`/`fwrite`. Files are `Value::File`, wrapping a
//! `std::fs::File` the way the original wraps a `FILE*`; the three standard
//! streams are `Value::RawFileHandle` constants instead, since they don't
//! own anything a VM reset needs to flush or close.

use super::{expect_string, Globals};
use crate::native::{native, native_error};
use std::cell::RefCell;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;
use wisp_core::Value;

const STDIN_HANDLE: i64 = 0;
const STDOUT_HANDLE: i64 = 1;
const STDERR_HANDLE: i64 = 2;

pub fn install(globals: &Globals) {
    let mut g = globals.borrow_mut();

    g.insert(
        "read".into(),
        native("read", None, |args| {
            if let Some(Value::String(prompt)) = args.first() {
                print!("{prompt}");
                let _ = std::io::stdout().flush();
            }
            let mut input = String::new();
            if std::io::stdin().lock().read_line(&mut input).is_err() {
                return native_error("read", "failed to read from stdin");
            }
            let input = input.trim_end_matches('\n').trim_end_matches('\r');
            if let Ok(n) = input.parse::<f64>() {
                Value::Number(n)
            } else if input == "true" {
                Value::Bool(true)
            } else if input == "false" {
                Value::Bool(false)
            } else {
                Value::String(Rc::from(input))
            }
        }),
    );

    g.insert(
        "fopen".into(),
        native("fopen", Some(2), |args| {
            let (name, mode) = match (expect_string(args, 0, "fopen"), expect_string(args, 1, "fopen")) {
                (Ok(n), Ok(m)) => (n, m),
                (Err(v), _) | (_, Err(v)) => return v,
            };
            let mut options = std::fs::OpenOptions::new();
            match mode.as_ref() {
                "r" => {
                    options.read(true);
                }
                "w" => {
                    options.write(true).create(true).truncate(true);
                }
                "a" => {
                    options.append(true).create(true);
                }
                other => return native_error("fopen", &format!("invalid file mode '{other}'")),
            }
            match options.open(name.as_ref()) {
                Ok(file) => Value::File(Rc::new(RefCell::new(file))),
                Err(e) => native_error("fopen", &format!("file '{name}' is not open: {e}")),
            }
        }),
    );

    g.insert(
        "fclose".into(),
        native("fclose", Some(1), |args| match args.first() {
            Some(v @ Value::File(_)) => v.clone(),
            _ => native_error("fclose", "expected type is {file}"),
        }),
    );

    g.insert(
        "fflush".into(),
        native("fflush", Some(1), |args| match args.first() {
            Some(Value::File(f)) => {
                let _ = f.borrow_mut().flush();
                Value::File(f.clone())
            }
            _ => native_error("fflush", "expected type is {file}"),
        }),
    );

    g.insert(
        "fread".into(),
        native("fread", Some(1), |args| match args.first() {
            Some(Value::File(f)) => {
                let mut contents = String::new();
                match f.borrow_mut().read_to_string(&mut contents) {
                    Ok(_) => Value::String(Rc::from(contents.as_str())),
                    Err(e) => native_error("fread", &format!("read failed: {e}")),
                }
            }
            _ => native_error("fread", "expected type is {file}"),
        }),
    );

    g.insert(
        "fwrite".into(),
        native("fwrite", Some(2), |args| {
            let data = match expect_string(args, 1, "fwrite") {
                Ok(d) => d,
                Err(v) => return v,
            };
            match args.first() {
                Some(Value::File(f)) => match f.borrow_mut().write_all(data.as_bytes()) {
                    Ok(()) => Value::File(f.clone()),
                    Err(e) => native_error("fwrite", &format!("write failed: {e}")),
                },
                _ => native_error("fwrite", "expected type is {file}"),
            }
        }),
    );

    g.insert("stdin".into(), Value::RawFileHandle(STDIN_HANDLE));
    g.insert("stdout".into(), Value::RawFileHandle(STDOUT_HANDLE));
    g.insert("stderr".into(), Value::RawFileHandle(STDERR_HANDLE));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn installs_console_and_file_functions() {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install(&globals);
        for name in ["read", "fopen", "fclose", "fflush", "fread", "fwrite", "stdin", "stdout", "stderr"] {
            assert!(globals.borrow().contains_key(name));
        }
    }

    #[test]
    fn fopen_write_then_fread_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.txt");
        let path_str = path.to_str().unwrap().to_string();

        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        install(&globals);
        let fopen = globals.borrow().get("fopen").cloned().unwrap();
        let fwrite = globals.borrow().get("fwrite").cloned().unwrap();

        let Value::NativeFunction(fopen) = fopen else {
            panic!("fopen should be native")
        };
        let Value::NativeFunction(fwrite) = fwrite else {
            panic!("fwrite should be native")
        };

        let file = (fopen.func)(&[
            Value::String(Rc::from(path_str.as_str())),
            Value::String(Rc::from("w")),
        ]);
        assert!(matches!(file, Value::File(_)));
        let written = (fwrite.func)(&[file, Value::String(Rc::from("hello"))]);
        assert!(matches!(written, Value::File(_)));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }
}
