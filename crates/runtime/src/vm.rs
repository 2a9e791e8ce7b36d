//! The stack-based bytecode interpreter (spec §4.5).
//!
//! A tight `match` over `OpCode` reading one instruction at a time from the
//! current call frame's chunk. Grounded in `examples/original_source/src/core_vm.cpp`
//! for dispatch order and exact stack-slot conventions (`Invoke`/`SuperInvoke`
//! fusing, `GetSuper`'s this-then-superclass pop order, `Inherit`'s
//! subclass/superclass stack positions).

use crate::config::Config;
use crate::error::{RuntimeError, TraceFrame};
use crate::stdlib::{self, Globals};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;
use wisp_core::{
    BoundMethodObj, ClassObj, ClosureObj, FunctionObj, InstanceObj, OpCode, Upvalue, Value,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

struct CallFrame {
    closure: Rc<ClosureObj>,
    ip: usize,
    /// Index into `VM::stack` of this frame's slot 0.
    offset: usize,
}

pub struct VM {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Globals,
    /// Sorted ascending by stack index; the back is the upvalue closest to
    /// the top of stack (see `capture_upvalue`/`close_upvalues`).
    open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    config: Config,
}

impl VM {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let globals: Globals = Rc::new(RefCell::new(HashMap::new()));
        stdlib::install_builtins(&globals);
        VM {
            stack: Vec::with_capacity(config.stack_reserve),
            frames: Vec::with_capacity(config.frames_max),
            globals,
            open_upvalues: Vec::new(),
            config,
        }
    }

    /// Reset transient state without touching globals, so a REPL can keep
    /// reusing one VM across lines even after a runtime error mid-expression.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    pub fn interpret(&mut self, function: Rc<FunctionObj>) -> InterpretResult {
        let closure = Rc::new(ClosureObj {
            function,
            upvalues: Vec::new(),
        });
        self.push(Value::Closure(closure.clone()));
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            offset: 0,
        });
        self.run()
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("VM stack underflow")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let byte = frame.closure.function.chunk.get_code(frame.ip);
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        ((hi as u16) << 8) | lo as u16
    }

    fn read_constant(&mut self) -> Value {
        let idx = self.read_byte();
        let frame = self.frames.last().expect("no active frame");
        frame.closure.function.chunk.get_constant(idx).clone()
    }

    fn read_string_constant(&mut self) -> Rc<str> {
        match self.read_constant() {
            Value::String(s) => s,
            other => unreachable!("constant pool entry used as a name was not a string: {other:?}"),
        }
    }

    // ---- upvalues -------------------------------------------------------

    fn read_upvalue(&self, cell: &Rc<RefCell<Upvalue>>) -> Value {
        match &*cell.borrow() {
            Upvalue::Open(idx) => self.stack[*idx].clone(),
            Upvalue::Closed(v) => v.clone(),
        }
    }

    fn write_upvalue(&mut self, cell: &Rc<RefCell<Upvalue>>, value: Value) {
        let open_index = match &*cell.borrow() {
            Upvalue::Open(idx) => Some(*idx),
            Upvalue::Closed(_) => None,
        };
        match open_index {
            Some(idx) => self.stack[idx] = value,
            None => *cell.borrow_mut() = Upvalue::Closed(value),
        }
    }

    fn capture_upvalue(&mut self, index: usize) -> Rc<RefCell<Upvalue>> {
        if let Some(existing) = self.open_upvalues.iter().find(|c| {
            matches!(&*c.borrow(), Upvalue::Open(i) if *i == index)
        }) {
            return existing.clone();
        }

        let insert_at = self
            .open_upvalues
            .iter()
            .position(|c| matches!(&*c.borrow(), Upvalue::Open(i) if *i > index))
            .unwrap_or(self.open_upvalues.len());
        let cell = Rc::new(RefCell::new(Upvalue::Open(index)));
        self.open_upvalues.insert(insert_at, cell.clone());
        cell
    }

    fn close_upvalues(&mut self, floor: usize) {
        while let Some(last) = self.open_upvalues.last() {
            let idx = match &*last.borrow() {
                Upvalue::Open(i) => *i,
                Upvalue::Closed(_) => break,
            };
            if idx < floor {
                break;
            }
            let cell = self.open_upvalues.pop().unwrap();
            let value = self.stack[idx].clone();
            *cell.borrow_mut() = Upvalue::Closed(value);
        }
    }

    // ---- calls ------------------------------------------------------------

    fn call_closure(&mut self, closure: Rc<ClosureObj>, argc: usize) -> Result<(), String> {
        if argc as u8 != closure.function.arity {
            return Err(format!(
                "Expected {} arguments but got {argc}.",
                closure.function.arity
            ));
        }
        if self.frames.len() >= self.config.frames_max {
            return Err("Stack overflow.".to_string());
        }
        let offset = self.stack.len() - argc - 1;
        trace!(
            function = closure.function.display_name(),
            argc,
            offset,
            "call frame pushed"
        );
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            offset,
        });
        Ok(())
    }

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), String> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Class(class) => {
                let instance = Value::Instance(Rc::new(RefCell::new(InstanceObj::new(class.clone()))));
                let callee_slot = self.stack.len() - argc - 1;
                self.stack[callee_slot] = instance;
                let initializer = class.borrow().methods.get("init").cloned();
                match initializer {
                    Some(init) => self.call_closure(init, argc),
                    None if argc == 0 => Ok(()),
                    None => Err(format!("Expected 0 arguments but got {argc}.")),
                }
            }
            Value::BoundMethod(bound) => {
                let callee_slot = self.stack.len() - argc - 1;
                self.stack[callee_slot] = bound.receiver.clone();
                self.call_closure(bound.method.clone(), argc)
            }
            Value::NativeFunction(native) => {
                let args_start = self.stack.len() - argc;
                let result = (native.func)(&self.stack[args_start..]);
                self.stack.truncate(args_start - 1);
                self.push(result);
                Ok(())
            }
            _ => Err("Can only call functions and classes.".to_string()),
        }
    }

    fn invoke_from_class(&mut self, class: &Rc<RefCell<ClassObj>>, name: &str, argc: usize) -> Result<(), String> {
        let method = class.borrow().methods.get(name).cloned();
        match method {
            Some(closure) => self.call_closure(closure, argc),
            None => Err(format!("Undefined property '{name}'.")),
        }
    }

    // ---- arithmetic helpers -------------------------------------------

    fn numeric_binary(&mut self, op: impl Fn(f64, f64) -> Value) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(op(x, y));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    fn bitwise_binary(&mut self, op: impl Fn(i64, i64) -> i64) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(Value::Number(op(x as i64, y as i64) as f64));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    // ---- error reporting --------------------------------------------------

    fn runtime_error(&mut self, message: impl Into<String>) -> InterpretResult {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| TraceFrame {
                function_name: frame.closure.function.name.clone(),
                line: frame.closure.function.chunk.get_line(frame.ip.saturating_sub(1)),
            })
            .collect();
        let err = RuntimeError::new(message, trace);
        eprintln!("{err}");
        self.reset();
        InterpretResult::RuntimeError
    }

    // ---- dispatch -----------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn run(&mut self) -> InterpretResult {
        loop {
            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(b) => return self.runtime_error(format!("Invalid opcode byte {b}.")),
            };
            trace!(?op, stack_depth = self.stack.len(), "dispatch");

            match op {
                OpCode::Constant => {
                    let v = self.read_constant();
                    self.push(v);
                }
                OpCode::Null => self.push(Value::Null),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let offset = self.frames.last().unwrap().offset;
                    self.push(self.stack[offset + slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let offset = self.frames.last().unwrap().offset;
                    self.stack[offset + slot] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let name = self.read_string_constant();
                    match self.globals.borrow().get(&name).cloned() {
                        Some(v) => self.push(v),
                        None => return self.runtime_error(format!("Undefined variable '{name}'.")),
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string_constant();
                    let v = self.pop();
                    self.globals.borrow_mut().insert(name, v);
                }
                OpCode::SetGlobal => {
                    let name = self.read_string_constant();
                    let v = self.peek(0).clone();
                    if !self.globals.borrow().contains_key(&name) {
                        return self.runtime_error(format!("Undefined variable '{name}'."));
                    }
                    self.globals.borrow_mut().insert(name, v);
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let cell = self.frames.last().unwrap().closure.upvalues[slot].clone();
                    self.push(self.read_upvalue(&cell));
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let cell = self.frames.last().unwrap().closure.upvalues[slot].clone();
                    let v = self.peek(0).clone();
                    self.write_upvalue(&cell, v);
                }
                OpCode::GetProperty => {
                    let name = self.read_string_constant();
                    let receiver = self.pop();
                    let Value::Instance(instance) = receiver else {
                        return self.runtime_error("Only instances have properties.".to_string());
                    };
                    if let Some(field) = instance.borrow().fields.get(&name).cloned() {
                        self.push(field);
                        continue;
                    }
                    let class = instance.borrow().class.clone();
                    let method = class.borrow().methods.get(&name).cloned();
                    match method {
                        Some(closure) => {
                            let bound = Value::BoundMethod(Rc::new(BoundMethodObj {
                                receiver: Value::Instance(instance),
                                method: closure,
                            }));
                            self.push(bound);
                        }
                        None => return self.runtime_error(format!("Undefined property '{name}'.")),
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string_constant();
                    let value = self.pop();
                    let receiver = self.pop();
                    let Value::Instance(instance) = receiver else {
                        return self.runtime_error("Only instances have fields.".to_string());
                    };
                    instance.borrow_mut().fields.insert(name, value.clone());
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string_constant();
                    let superclass = self.pop();
                    let this_val = self.pop();
                    let Value::Class(class) = superclass else {
                        return self.runtime_error("Superclass must be a class.".to_string());
                    };
                    let method = class.borrow().methods.get(&name).cloned();
                    match method {
                        Some(closure) => {
                            let bound = Value::BoundMethod(Rc::new(BoundMethodObj {
                                receiver: this_val,
                                method: closure,
                            }));
                            self.push(bound);
                        }
                        None => return self.runtime_error(format!("Undefined property '{name}'.")),
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => {
                    if let Err(e) = self.numeric_binary(|a, b| Value::Bool(a > b)) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Less => {
                    if let Err(e) = self.numeric_binary(|a, b| Value::Bool(a < b)) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Add => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = match (&a, &b) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        (Value::String(x), Value::String(y)) => {
                            Value::String(Rc::from(format!("{x}{y}").as_str()))
                        }
                        (Value::String(x), Value::Number(y)) => {
                            Value::String(Rc::from(format!("{x}{}", wisp_core::format_number(*y)).as_str()))
                        }
                        (Value::Number(x), Value::String(y)) => Value::String(Rc::from(
                            format!("{}{y}", wisp_core::format_number(*x)).as_str(),
                        )),
                        _ => {
                            return self.runtime_error("Operands must be two numbers or two strings.".to_string())
                        }
                    };
                    self.push(result);
                }
                OpCode::Subtract => {
                    if let Err(e) = self.numeric_binary(|a, b| Value::Number(a - b)) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Multiply => {
                    if let Err(e) = self.numeric_binary(|a, b| Value::Number(a * b)) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Divide => {
                    if let Err(e) = self.numeric_binary(|a, b| Value::Number(a / b)) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsy()));
                }
                OpCode::Negate => match self.pop() {
                    Value::Number(n) => self.push(Value::Number(-n)),
                    _ => return self.runtime_error("Operand must be a number.".to_string()),
                },
                OpCode::BwAnd => {
                    if let Err(e) = self.bitwise_binary(|a, b| a & b) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::BwOr => {
                    if let Err(e) = self.bitwise_binary(|a, b| a | b) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::BwXor => {
                    if let Err(e) = self.bitwise_binary(|a, b| a ^ b) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::BwNot => match self.pop() {
                    Value::Number(n) => self.push(Value::Number(!(n as i64) as f64)),
                    _ => return self.runtime_error("Operand must be a number.".to_string()),
                },
                OpCode::Print => {
                    let v = self.pop();
                    println!("{}", v.display());
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsy() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                OpCode::Call => {
                    let argc = self.read_byte() as usize;
                    let callee = self.peek(argc).clone();
                    if let Err(e) = self.call_value(callee, argc) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Invoke => {
                    let name = self.read_string_constant();
                    let argc = self.read_byte() as usize;
                    let receiver = self.peek(argc).clone();
                    let Value::Instance(instance) = receiver else {
                        return self.runtime_error("Only instances have methods.".to_string());
                    };
                    if let Some(field) = instance.borrow().fields.get(&name).cloned() {
                        let slot = self.stack.len() - argc - 1;
                        self.stack[slot] = field.clone();
                        if let Err(e) = self.call_value(field, argc) {
                            return self.runtime_error(e);
                        }
                    } else {
                        let class = instance.borrow().class.clone();
                        if let Err(e) = self.invoke_from_class(&class, &name, argc) {
                            return self.runtime_error(e);
                        }
                    }
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string_constant();
                    let argc = self.read_byte() as usize;
                    let superclass = self.pop();
                    let Value::Class(class) = superclass else {
                        return self.runtime_error("Superclass must be a class.".to_string());
                    };
                    if let Err(e) = self.invoke_from_class(&class, &name, argc) {
                        return self.runtime_error(e);
                    }
                }
                OpCode::Closure => {
                    let function = match self.read_constant() {
                        Value::Function(f) => f,
                        other => unreachable!("Closure operand was not a Function: {other:?}"),
                    };
                    let upvalue_count = function.upvalue_count as usize;
                    let mut upvalues = Vec::with_capacity(upvalue_count);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        if is_local {
                            let frame_offset = self.frames.last().unwrap().offset;
                            upvalues.push(self.capture_upvalue(frame_offset + index));
                        } else {
                            let enclosing = self.frames.last().unwrap().closure.clone();
                            upvalues.push(enclosing.upvalues[index].clone());
                        }
                    }
                    self.push(Value::Closure(Rc::new(ClosureObj { function, upvalues })));
                }
                OpCode::CloseUpvalue => {
                    let idx = self.stack.len() - 1;
                    self.close_upvalues(idx);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("Return with no active frame");
                    trace!(
                        function = frame.closure.function.display_name(),
                        offset = frame.offset,
                        "call frame popped"
                    );
                    self.close_upvalues(frame.offset);
                    if self.frames.is_empty() {
                        self.pop();
                        return InterpretResult::Ok;
                    }
                    self.stack.truncate(frame.offset);
                    self.push(result);
                }
                OpCode::Class => {
                    let name = self.read_string_constant();
                    self.push(Value::Class(Rc::new(RefCell::new(ClassObj::new(name)))));
                }
                OpCode::Inherit => {
                    let superclass_val = self.peek(1).clone();
                    let Value::Class(superclass) = superclass_val else {
                        return self.runtime_error("Superclass must be a class.".to_string());
                    };
                    let Value::Class(subclass) = self.peek(0).clone() else {
                        unreachable!("Inherit's subclass operand was not a Class")
                    };
                    let methods = superclass.borrow().methods.clone();
                    subclass.borrow_mut().methods.extend(methods);
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_string_constant();
                    let Value::Closure(closure) = self.pop() else {
                        unreachable!("Method's closure operand was not a Closure")
                    };
                    let Value::Class(class) = self.peek(0).clone() else {
                        unreachable!("Method's class operand was not a Class")
                    };
                    class.borrow_mut().methods.insert(name, closure);
                }
                OpCode::ArrBuild => {
                    let count = self.read_byte() as usize;
                    let start = self.stack.len() - count;
                    let items = self.stack.split_off(start);
                    self.push(Value::Array(Rc::new(RefCell::new(items))));
                }
                OpCode::ArrIndex => {
                    let index_val = self.pop();
                    let array_val = self.pop();
                    let Value::Number(idx_f) = index_val else {
                        return self.runtime_error("Array index must be a number.".to_string());
                    };
                    let Value::Array(array) = array_val else {
                        return self.runtime_error("Only arrays can be indexed.".to_string());
                    };
                    if idx_f.fract() != 0.0 || idx_f < 0.0 || idx_f >= array.borrow().len() as f64 {
                        return self.runtime_error("Array index out of bounds".to_string());
                    }
                    let v = array.borrow()[idx_f as usize].clone();
                    self.push(v);
                }
                OpCode::ArrStore => {
                    let value = self.pop();
                    let index_val = self.pop();
                    let array_val = self.pop();
                    let Value::Number(idx_f) = index_val else {
                        return self.runtime_error("Array index must be a number.".to_string());
                    };
                    let Value::Array(array) = array_val else {
                        return self.runtime_error("Only arrays can be indexed.".to_string());
                    };
                    if idx_f.fract() != 0.0 || idx_f < 0.0 || idx_f >= array.borrow().len() as f64 {
                        return self.runtime_error("Array index out of bounds".to_string());
                    }
                    array.borrow_mut()[idx_f as usize] = value.clone();
                    self.push(value);
                }
            }
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_source(source: &str) -> InterpretResult {
        let function = wispc_lib::compile(source).expect("expected clean compile");
        let mut vm = VM::new();
        vm.interpret(function)
    }

    #[test]
    fn leaves_stack_empty_on_clean_interpretation() {
        let function = wispc_lib::compile("print 1 + 2 * 3;").unwrap();
        let mut vm = VM::new();
        assert_eq!(vm.interpret(function), InterpretResult::Ok);
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn closure_counter_increments_across_calls() {
        assert_eq!(
            run_source(
                "func make() { var x = 0; func incr() { x = x + 1; return x; } return incr; } \
                 var c = make(); print c(); print c(); print c();"
            ),
            InterpretResult::Ok
        );
    }

    #[test]
    fn inherited_method_runs_on_subclass_instance() {
        assert_eq!(
            run_source("class A { greet() { print \"hi\"; } } class B < A {} B().greet();"),
            InterpretResult::Ok
        );
    }

    #[test]
    fn initializer_and_methods_share_instance_state() {
        assert_eq!(
            run_source(
                "class Counter { init(n) { this.n = n; } tick() { this.n = this.n + 1; return this.n; } } \
                 var k = Counter(10); print k.tick(); print k.tick();"
            ),
            InterpretResult::Ok
        );
    }

    #[test]
    fn array_index_and_store_roundtrip() {
        assert_eq!(
            run_source("var a = [10, 20, 30]; print a[1]; a[1] = 99; print a[1];"),
            InterpretResult::Ok
        );
    }

    #[test]
    fn calling_a_non_callable_is_a_runtime_error() {
        assert_eq!(run_source("var f = 1; f();"), InterpretResult::RuntimeError);
    }

    #[test]
    fn out_of_bounds_array_index_is_a_runtime_error() {
        assert_eq!(run_source("print [1, 2][5];"), InterpretResult::RuntimeError);
    }

    #[test]
    fn adding_a_number_and_an_incompatible_value_is_a_runtime_error() {
        assert_eq!(run_source("print 1 + true;"), InterpretResult::RuntimeError);
    }

    #[test]
    fn vm_state_resets_after_a_runtime_error_so_repl_can_continue() {
        let mut vm = VM::new();
        let bad = wispc_lib::compile("var f = 1; f();").unwrap();
        assert_eq!(vm.interpret(bad), InterpretResult::RuntimeError);
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());

        let good = wispc_lib::compile("print 1 + 1;").unwrap();
        assert_eq!(vm.interpret(good), InterpretResult::Ok);
    }
}
