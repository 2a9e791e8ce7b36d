//! Scope and upvalue resolution: one `Compiler` per function being built,
//! threaded together through an owned parent link rather than a back
//! pointer into the parser (Design Notes, spec.md §9).

use tracing::debug;
use wisp_core::{FunctionObj, OpCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local {
    name: String,
    /// -1 marks "declared but not yet initialized" (depth is set by
    /// `mark_initialized` once the initializer has been compiled).
    depth: i32,
    is_captured: bool,
}

struct UpvalueSlot {
    index: u8,
    is_local: bool,
}

pub struct Compiler {
    pub function: FunctionObj,
    pub function_type: FunctionType,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueSlot>,
    scope_depth: i32,
    pub enclosing: Option<Box<Compiler>>,
}

impl Compiler {
    pub fn new(function_type: FunctionType, name: String, enclosing: Option<Box<Compiler>>) -> Self {
        // Slot 0 is reserved: named `this` for methods/initializers,
        // unusable from user code otherwise.
        let slot0_name = if matches!(function_type, FunctionType::Method | FunctionType::Initializer)
        {
            "this".to_string()
        } else {
            String::new()
        };

        Compiler {
            function: FunctionObj::new(name),
            function_type,
            locals: vec![Local {
                name: slot0_name,
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
            enclosing,
        }
    }

    pub fn scope_depth(&self) -> i32 {
        self.scope_depth
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
        debug!(depth = self.scope_depth, "scope entered");
    }

    /// Pops every local declared at or deeper than the scope being closed,
    /// emitting `CloseUpvalue` for captured locals and `Pop` otherwise, in
    /// reverse declaration order. Returns the popped count (callers need it
    /// for nothing further; the emission already happened).
    pub fn end_scope(&mut self, line: u32) -> usize {
        self.scope_depth -= 1;
        debug!(depth = self.scope_depth, "scope exited");
        let mut popped = 0;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            let local = self.locals.pop().unwrap();
            if local.is_captured {
                self.function.chunk.write_op(OpCode::CloseUpvalue, line);
            } else {
                self.function.chunk.write_op(OpCode::Pop, line);
            }
            popped += 1;
        }
        popped
    }

    /// Declares `name` as a local in the current scope. No-op at global
    /// scope (depth 0) — globals are resolved by name at runtime, not by
    /// slot.
    pub fn declare_variable(&mut self, name: &str) -> Result<(), String> {
        if self.scope_depth == 0 {
            return Ok(());
        }

        for local in self.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.scope_depth {
                break;
            }
            if local.name == name {
                return Err("Already a variable with this name in this scope.".to_string());
            }
        }

        self.add_local(name.to_string())
    }

    fn add_local(&mut self, name: String) -> Result<(), String> {
        if self.locals.len() >= u8::MAX as usize + 1 {
            return Err("Too many local variables in function.".to_string());
        }
        self.locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
        Ok(())
    }

    /// Called once a `var` initializer (or, for functions, the body) has
    /// been compiled, so the most recently declared local becomes visible.
    pub fn mark_initialized(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.locals.last_mut() {
            local.depth = self.scope_depth;
        }
    }

    /// Scans locals newest-to-oldest. `Ok(None)` means "not a local, try
    /// upvalue/global"; `Err` means the name resolved to a local that's
    /// still mid-initialization (`var x = x;`).
    pub fn resolve_local(&self, name: &str) -> Result<Option<u8>, String> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    return Err(
                        "Can't read local variable in its own initializer.".to_string()
                    );
                }
                return Ok(Some(i as u8));
            }
        }
        Ok(None)
    }

    /// Resolves `name` as an upvalue, threading capture through every
    /// intermediate function between this compiler and whichever ancestor
    /// actually owns the local.
    pub fn resolve_upvalue(&mut self, name: &str) -> Result<Option<u8>, String> {
        let Some(enclosing) = self.enclosing.as_mut() else {
            return Ok(None);
        };

        if let Some(local_idx) = enclosing.resolve_local(name)? {
            enclosing.mark_captured(local_idx);
            debug!(name, slot = local_idx, "upvalue captured");
            return self.add_upvalue(local_idx, true).map(Some);
        }

        if let Some(upvalue_idx) = enclosing.resolve_upvalue(name)? {
            return self.add_upvalue(upvalue_idx, false).map(Some);
        }

        Ok(None)
    }

    fn mark_captured(&mut self, local_slot: u8) {
        if let Some(local) = self.locals.get_mut(local_slot as usize) {
            local.is_captured = true;
        }
    }

    /// Deduplicates `(index, is_local)` pairs so a variable captured twice
    /// in the same function reuses one upvalue slot.
    fn add_upvalue(&mut self, index: u8, is_local: bool) -> Result<u8, String> {
        for (i, existing) in self.upvalues.iter().enumerate() {
            if existing.index == index && existing.is_local == is_local {
                return Ok(i as u8);
            }
        }

        if self.upvalues.len() >= u8::MAX as usize + 1 {
            return Err("Too many closure variables in function.".to_string());
        }

        self.upvalues.push(UpvalueSlot { index, is_local });
        self.function.upvalue_count = self.upvalues.len() as u8;
        Ok((self.upvalues.len() - 1) as u8)
    }

    /// `(is_local, index)` pairs in the order `Closure` needs to read them
    /// back at runtime.
    pub fn upvalue_capture_bytes(&self) -> Vec<(bool, u8)> {
        self.upvalues
            .iter()
            .map(|u| (u.is_local, u.index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_a_name_in_the_same_scope_is_an_error() {
        let mut c = Compiler::new(FunctionType::Script, String::new(), None);
        c.begin_scope();
        c.declare_variable("x").unwrap();
        let err = c.declare_variable("x").unwrap_err();
        assert_eq!(err, "Already a variable with this name in this scope.");
    }

    #[test]
    fn reading_own_initializer_is_an_error() {
        let mut c = Compiler::new(FunctionType::Script, String::new(), None);
        c.begin_scope();
        c.declare_variable("x").unwrap();
        let err = c.resolve_local("x").unwrap_err();
        assert_eq!(err, "Can't read local variable in its own initializer.");
    }

    #[test]
    fn global_scope_declarations_are_not_locals() {
        let mut c = Compiler::new(FunctionType::Script, String::new(), None);
        c.declare_variable("x").unwrap();
        assert_eq!(c.resolve_local("x").unwrap(), None);
    }

    #[test]
    fn upvalue_resolution_threads_through_nesting() {
        let mut outer = Compiler::new(FunctionType::Script, String::new(), None);
        outer.begin_scope();
        outer.declare_variable("x").unwrap();
        outer.mark_initialized();

        let middle = Compiler::new(FunctionType::Function, "middle".to_string(), Some(Box::new(outer)));
        let mut inner = Compiler::new(FunctionType::Function, "inner".to_string(), Some(Box::new(middle)));

        let slot = inner.resolve_upvalue("x").unwrap();
        assert_eq!(slot, Some(0));
        // Resolving again should reuse the same upvalue slot.
        let slot_again = inner.resolve_upvalue("x").unwrap();
        assert_eq!(slot_again, Some(0));
    }
}
