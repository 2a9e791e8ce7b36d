//! Core data model shared by the compiler and the VM: the runtime `Value`
//! representation, the bytecode `Chunk` it's stored in, and the heap object
//! types (`FunctionObj`, `ClosureObj`, `ClassObj`, ...) a `Value` can carry.
//!
//! This crate has no knowledge of parsing or dispatch; it is the "shape" of
//! the language, in the same spirit as the teacher's `seq-core` being the
//! shared foundation beneath `seq-compiler` and `seq-runtime`.

pub mod chunk;
pub mod opcode;
pub mod value;

pub use chunk::Chunk;
pub use opcode::OpCode;
pub use value::{
    BoundMethodObj, ClassObj, ClosureObj, FunctionObj, InstanceObj, NativeFn, NativeFunctionObj,
    Upvalue, Value, format_number,
};
