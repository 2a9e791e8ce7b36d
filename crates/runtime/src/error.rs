//! Runtime error type and stack-trace rendering.
//!
//! Grounded in the teacher's hand-rolled `Display`-based error enums
//! (`wispc_lib`'s `codegen::error::CodeGenError`) rather than `anyhow`'s
//! opaque error or `thiserror`'s derive — the VM has exactly one error
//! shape to report and no library boundary that needs `anyhow`'s erasure.

use std::fmt;

/// A single frame of the call stack at the point a runtime error occurred,
/// innermost first (spec §7: "stack trace, innermost frame first").
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub function_name: String,
    pub line: u32,
}

/// Raised by the VM's dispatch loop on a type error, arity mismatch, undefined
/// variable/property, or division by zero. `trace` already includes the
/// faulting frame itself (innermost first, ending at the top-level script).
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, trace: Vec<TraceFrame>) -> Self {
        RuntimeError {
            message: message.into(),
            trace,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for (i, frame) in self.trace.iter().enumerate() {
            let name = if frame.function_name.is_empty() {
                "script"
            } else {
                frame.function_name.as_str()
            };
            if i + 1 == self.trace.len() {
                write!(f, "[line {}] in {name}", frame.line)?;
            } else {
                writeln!(f, "[line {}] in {name}", frame.line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_innermost_frame_first() {
        let err = RuntimeError::new(
            "Undefined property 'x'.",
            vec![
                TraceFrame {
                    function_name: "tick".to_string(),
                    line: 4,
                },
                TraceFrame {
                    function_name: String::new(),
                    line: 10,
                },
            ],
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("Undefined property 'x'.\n[line 4] in tick"));
        assert!(rendered.ends_with("[line 10] in script"));
    }
}
