use crate::String;
use crate::types::Type;
use thiserror::Error;

/// Shape errors reported while building an expression tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("operator {op} is not defined for {left} and {right}")]
    BinaryOperandTypes { op: String, left: Type, right: Type },

    #[error("operator {op} is not defined for {operand}")]
    UnaryOperandType { op: String, operand: Type },

    #[error("expression of type {found} cannot be used where {expected} is expected")]
    TypeMismatch { expected: Type, found: Type },

    #[error("no conversion from {from} to {to}")]
    NoConversion { from: Type, to: Type },

    #[error("{what} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("method {method} receiver mismatch (static: {is_static})")]
    ReceiverMismatch { method: String, is_static: bool },

    #[error("expression is not assignable")]
    NotAssignable,

    #[error("label '{label}' of type {ty} needs a value")]
    LabelNeedsValue { label: String, ty: Type },

    #[error("type {ty} has no indexer")]
    NoIndexer { ty: Type },

    #[error("{0}")]
    Invalid(String),
}
