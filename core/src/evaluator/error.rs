//! Runtime errors shared by the evaluator and the VM.
//!
//! # Error Categories
//!
//! - **Thrown values**: exceptions raised by `throw`, by host methods or by the
//!   runtime itself (division by zero, null receivers, bad casts). These are
//!   the only errors `try`/`catch` can observe.
//!
//! - **Resource exceeded errors**: fatal resource limit violations that cannot be
//!   caught (e.g., stack overflow). They unwind through every protected region
//!   without running handlers.
//!
//! - **Invalid invocations**: a callable was called with the wrong number of
//!   arguments, or a jump had no enclosing target.

use crate::String;
use crate::values::{Exception, Value};
use core::fmt;

/// Runtime evaluation error.
#[derive(Debug, Clone)]
pub enum ExecutionError {
    /// An exception in flight.
    Thrown(Value),

    /// Resource limit exceeded (cannot be caught).
    ResourceExceeded(ResourceExceededError),

    /// Argument count or shape did not match the callee.
    InvalidArguments { expected: usize, got: usize },

    /// A jump whose label is not reachable from where it was taken.
    InvalidJump { label: String },

    /// Broken runtime invariant (a malformed value reached an instruction).
    Internal(String),
}

/// Resource limit exceeded errors that cannot be caught.
#[derive(Debug, Clone)]
pub enum ResourceExceededError {
    /// Evaluation recursion depth exceeded.
    StackOverflow { depth: usize, max_depth: usize },
}

impl ExecutionError {
    pub fn raise(exception: Exception) -> Self {
        ExecutionError::Thrown(Value::exception(exception))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExecutionError::Internal(message.into())
    }

    pub fn check_arity(expected: usize, got: usize) -> Result<(), Self> {
        if expected == got {
            Ok(())
        } else {
            Err(ExecutionError::InvalidArguments { expected, got })
        }
    }

    /// The thrown exception object, if this error is catchable.
    pub fn thrown(&self) -> Option<&Value> {
        match self {
            ExecutionError::Thrown(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Thrown(value) => write!(f, "Unhandled exception: {}", value),
            ExecutionError::ResourceExceeded(e) => write!(f, "{}", e),
            ExecutionError::InvalidArguments { expected, got } => {
                write!(f, "Expected {} argument(s), got {}", expected, got)
            }
            ExecutionError::InvalidJump { label } => {
                write!(f, "Jump to label '{}' has no reachable target", label)
            }
            ExecutionError::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl fmt::Display for ResourceExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceExceededError::StackOverflow { depth, max_depth } => {
                write!(
                    f,
                    "Evaluation stack overflow: depth {} exceeds maximum of {}",
                    depth, max_depth
                )
            }
        }
    }
}

impl From<ResourceExceededError> for ExecutionError {
    fn from(e: ResourceExceededError) -> Self {
        ExecutionError::ResourceExceeded(e)
    }
}

impl From<Exception> for ExecutionError {
    fn from(e: Exception) -> Self {
        ExecutionError::raise(e)
    }
}

impl core::error::Error for ExecutionError {}

impl core::error::Error for ResourceExceededError {}
