//! Tree-walking evaluator for expression trees.
//!
//! The evaluator is the general execution path: it runs every tree the
//! builder accepts, including the constructs the bytecode compiler declines,
//! and defines the semantics the compiled form must reproduce.
//!
//! ## Design Principles
//!
//! - **Never panic**: malformed runtime states surface as
//!   [`ExecutionError::Internal`].
//! - **Stack-safe**: depth tracking bounds recursion, including recursion
//!   through interpreted lambdas calling each other.
//! - **Shared operators**: primitive operators live in [`operators`] and are
//!   used by the VM as well.
//!
//! ## Example
//!
//! ```ignore
//! use vellum_core::ast::builder as b;
//! use vellum_core::evaluator::{ExecutionOptions, interpret};
//!
//! let x = b::param("x", Type::I32);
//! let body = b::add(&b::var(&x), &b::int(1))?;
//! let f = interpret(&b::lambda(None, &[x], &body), &ExecutionOptions::default());
//! assert_eq!(f.call(&[Value::I32(41)])?, Value::I32(42));
//! ```

mod error;
mod eval;
pub mod operators;

#[cfg(test)]
mod eval_test;

pub use error::{ExecutionError, ResourceExceededError};
pub use eval::InterpretedLambda;
pub use operators::{ArithOp, CmpOp};

use crate::{ast::LambdaExpr, values::Function};
use alloc::rc::Rc;

/// Evaluator limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum nesting of expression evaluation, across interpreted calls.
    pub max_depth: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self { max_depth: 1000 }
    }
}

/// Wraps `lambda` in a callable that evaluates its body on every call.
pub fn interpret(lambda: &Rc<LambdaExpr>, options: &ExecutionOptions) -> Rc<dyn Function> {
    Rc::new(InterpretedLambda::new(lambda.clone(), *options))
}
