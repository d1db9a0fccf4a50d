//! Stack-based virtual machine executing compiled units.

mod closure;
mod code;
mod instruction_set;
mod runtime;
mod stack;

pub use closure::{BytecodeClosure, ClosureRecord, OpenUnit};
pub use code::{Code, Handler, HandlerKind};
pub use instruction_set::Instruction;
pub use runtime::VM;

pub(crate) use stack::Stack;
