//! Bytecode compilation errors.
//!
//! Compilation can end three ways besides success:
//!
//! - an [`Unsupported`] construct: the fast path declines and the caller falls
//!   back to the evaluator;
//! - invalid input ([`CompileError`]): the tree cannot be executed by either
//!   path and the error is reported;
//! - a broken compiler invariant, also reported as a [`CompileError`].

use crate::ast::{BinaryOp, UnaryOp};
use crate::types::Type;
use crate::String;
use thiserror::Error;

/// A construct the bytecode compiler does not specialize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unsupported {
    #[error("catch blocks with filters")]
    FilteredCatch,

    #[error("jump to '{label}' with an unbalanced operand stack")]
    UnbalancedJump { label: String },

    #[error("jump to '{label}' out of a finally or fault block")]
    JumpOutOfFinally { label: String },

    #[error("assignment to a {kind} target")]
    CompoundAssignTarget { kind: &'static str },

    #[error("valued switch without a default case")]
    SwitchWithoutDefault,

    #[error("nested lambda with a supplied closure")]
    NestedLambdaWithSuppliedClosure,

    #[error("constant not present in the supplied closure")]
    MissingSuppliedConstant,

    #[error("lifted call to operator method {method}")]
    LiftedOperatorMethod { method: String },

    #[error("rethrow outside of a catch block")]
    RethrowOutsideCatch,
}

/// Errors that can occur during bytecode compilation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("variable '{name}' is not defined in any enclosing scope")]
    UndefinedVariable { name: String },

    #[error("label '{label}' was not registered by the collector")]
    LabelNotRegistered { label: String },

    #[error("label '{label}' is jumped to but never placed")]
    LabelNotPlaced { label: String },

    #[error("no operator {op:?} for operands of type {ty}")]
    MissingOperator { op: BinaryOp, ty: Type },

    #[error("no operator {op:?} for an operand of type {ty}")]
    MissingUnaryOperator { op: UnaryOp, ty: Type },

    #[error("labels cannot be used with a supplied closure")]
    LabelsWithSuppliedClosure,

    #[error("nested lambda '{name}' was not compiled before its use")]
    UnresolvedNestedUnit { name: String },

    #[error("captured variable '{name}' has no shared cell in the enclosing unit")]
    UnboxedCapture { name: String },

    #[error("too many local variables (limit: {limit})")]
    TooManyLocals { limit: u32 },

    #[error("too many constants (limit: {limit})")]
    TooManyConstants { limit: u32 },
}

/// Internal result of every compiler pass.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Failure {
    Unsupported(Unsupported),
    Error(CompileError),
}

impl From<Unsupported> for Failure {
    fn from(reason: Unsupported) -> Self {
        Failure::Unsupported(reason)
    }
}

impl From<CompileError> for Failure {
    fn from(error: CompileError) -> Self {
        Failure::Error(error)
    }
}

pub(crate) type PassResult<T = ()> = Result<T, Failure>;
