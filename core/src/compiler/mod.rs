//! Bytecode compiler for expression trees.
//!
//! A root lambda is compiled in two passes. The [`collector`] walks the tree
//! once and builds the closure plan of every unit: the identity constants it
//! references, the variables it captures and the nested lambdas it creates.
//! The [`emitter`] then walks the tree again and appends instructions for the
//! stack VM. Nested lambdas become independent units compiled bottom-up
//! ([`nested`]); the root unit is bound to its closure record by the
//! [`driver`].
//!
//! Constructs the compiler does not specialize never fail the compilation:
//! they surface as [`FastPath::Unsupported`] so callers can evaluate the tree
//! with the general evaluator instead.

mod closure_info;
mod collector;
mod driver;
mod emitter;
mod error;
mod nested;
mod pool;

#[cfg(test)]
mod emitter_test;

pub use driver::{CompiledLambda, FastPath, compile_fast, compile_with_closure, try_compile};
pub use error::{CompileError, Unsupported};
