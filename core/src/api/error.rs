//! Public error type of the compile facade.

use crate::compiler::CompileError;
use thiserror::Error;

/// Errors returned by [`compile`](super::compile).
///
/// Constructs the compiler merely declines are not errors: they fall back to
/// the evaluator, or produce `None` when fallback is disabled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The tree is invalid input for the compiler.
    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),
}
