//! Public API for compiling expression trees.
//!
//! [`compile`] turns a lambda into a callable. It tries the bytecode
//! compiler first and falls back to the tree-walking evaluator for trees the
//! compiler declines, so every tree the builder accepts stays executable.
//!
//! # Example
//!
//! ```ignore
//! use vellum_core::api::{CompilationOptions, compile};
//! use vellum_core::ast::builder as b;
//!
//! let x = b::param("x", Type::I32);
//! let y = b::param("y", Type::I32);
//! let body = b::add(&b::var(&x), &b::var(&y))?;
//! let lambda = b::lambda(Some("add"), &[x, y], &body);
//!
//! let f = compile(&lambda, &CompilationOptions::default())?.unwrap();
//! assert_eq!(f.call(&[Value::I32(2), Value::I32(3)])?, Value::I32(5));
//! ```

pub mod error;
pub mod options;


pub use error::Error;
pub use options::CompilationOptions;

use crate::{
    ast::LambdaExpr,
    compiler::{self, FastPath},
    evaluator,
    values::Function,
};
use alloc::rc::Rc;
use tracing::debug;

/// Compiles `lambda` into a callable.
///
/// Returns `Ok(None)` only when the compiler declines the tree and
/// `options.fallback` is off.
pub fn compile(
    lambda: &Rc<LambdaExpr>,
    options: &CompilationOptions,
) -> Result<Option<Rc<dyn Function>>, Error> {
    if options.fast_path {
        match compiler::try_compile(lambda)? {
            FastPath::Compiled(compiled) => return Ok(Some(compiled.into_function())),
            FastPath::Unsupported(reason) if options.fallback => {
                debug!(name = lambda.display_name(), %reason, "Falling back to the evaluator");
            }
            FastPath::Unsupported(reason) => {
                debug!(name = lambda.display_name(), %reason, "No fallback; not compiled");
                return Ok(None);
            }
        }
    } else if !options.fallback {
        return Ok(None);
    }
    Ok(Some(evaluator::interpret(
        lambda,
        &options.execution_options(),
    )))
}
