//! Runtime values shared by the VM and the evaluator.

mod exception;
mod function;
mod value;

pub use exception::{Exception, ExceptionKind};
pub use function::{Function, NativeFn, NativeFunction};
pub use value::{Address, SharedCell, StructData, Value};
