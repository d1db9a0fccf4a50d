//! Vellum - compile expression trees to stack-VM bytecode
//!
//! # Overview
//!
//! Vellum takes a typed expression tree (a lambda built with
//! [`ast::builder`]) and turns it into something callable. Trees the bytecode
//! compiler supports are compiled to compact stack-VM units; everything else
//! runs on a tree-walking evaluator with the same observable semantics.
//!
//! Common use cases include:
//!
//! - Rules and predicates assembled at runtime by a host application
//! - Computed fields and projections over host structs
//! - Small callbacks that close over host state
//!
//! # Quick Start
//!
//! ```ignore
//! use vellum::{CompilationOptions, Type, Value, ast::builder as b, compile};
//!
//! let flag = b::param("flag", Type::Bool);
//! let body = b::condition(&b::var(&flag), &b::string("yes"), &b::string("no"))?;
//! let lambda = b::lambda(Some("pick"), &[flag], &body);
//!
//! let f = compile(&lambda, &CompilationOptions::default())?.unwrap();
//! assert_eq!(f.call(&[Value::Bool(true)])?, Value::str("yes"));
//! ```
//!
//! # Execution Paths
//!
//! 1. **Fast path** ([`compiler::try_compile`]): bytecode for the VM. Reports
//!    constructs it declines instead of failing.
//! 2. **Fallback** ([`evaluator::interpret`]): evaluates any tree the builder
//!    accepts.
//!
//! [`compile`] tries them in that order, as configured by
//! [`CompilationOptions`].

// Re-export public API from vellum_core
pub use vellum_core::api::{CompilationOptions, Error, compile};

// Re-export the tree model and values
pub use vellum_core::ast::{self, BuildError, Expr, ExprRef, LambdaExpr};
pub use vellum_core::types::{self, MethodDef, Signature, StructDef, Type};
pub use vellum_core::values::{self, Exception, ExceptionKind, Function, NativeFunction, Value};

// Execution paths
pub use vellum_core::compiler::{self, CompileError, CompiledLambda, FastPath, Unsupported};
pub use vellum_core::evaluator::{self, ExecutionError, ExecutionOptions};
