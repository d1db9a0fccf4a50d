//! Callable values.
//!
//! Everything that can be invoked from an expression implements [`Function`]:
//! compiled closures, evaluator lambdas and host functions.

use super::Value;
use crate::evaluator::ExecutionError;
use crate::types::Signature;
use core::fmt;

pub trait Function {
    /// The function's declared signature.
    fn signature(&self) -> &Signature;

    /// Invokes the function.
    ///
    /// Implementations check the argument count and report a mismatch as
    /// [`ExecutionError::InvalidArguments`].
    fn call(&self, args: &[Value]) -> Result<Value, ExecutionError>;
}

/// Native host function pointer.
pub type NativeFn = fn(args: &[Value]) -> Result<Value, ExecutionError>;

/// A host function exposed as a callable value.
pub struct NativeFunction {
    signature: Signature,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(signature: Signature, func: NativeFn) -> Self {
        Self { signature, func }
    }
}

impl Function for NativeFunction {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: &[Value]) -> Result<Value, ExecutionError> {
        ExecutionError::check_arity(self.signature.params.len(), args.len())?;
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("signature", &self.signature)
            .finish()
    }
}
