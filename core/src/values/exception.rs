use crate::{String, ToString};
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionKind {
    DivideByZero,
    NullReference,
    IndexOutOfRange,
    InvalidCast,
    InvalidOperation,
    Argument,
    /// Raised by host code or by a `throw` of a user-built exception.
    User(String),
}

/// A runtime exception object.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn user(name: &str, message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::User(name.to_string()), message)
    }

    pub fn divide_by_zero() -> Self {
        Self::new(ExceptionKind::DivideByZero, "Attempted to divide by zero.")
    }

    pub fn null_reference() -> Self {
        Self::new(
            ExceptionKind::NullReference,
            "Object reference not set to an instance of an object.",
        )
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(
            ExceptionKind::IndexOutOfRange,
            alloc::format!("Index {} was outside the bounds of the array (length {}).", index, len),
        )
    }

    pub fn no_value() -> Self {
        Self::new(
            ExceptionKind::InvalidOperation,
            "Nullable object must have a value.",
        )
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExceptionKind::User(name) => write!(f, "{}: {}", name, self.message),
            kind => write!(f, "{:?}: {}", kind, self.message),
        }
    }
}
