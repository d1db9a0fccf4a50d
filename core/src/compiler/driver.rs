//! Top-level compilation.
//!
//! A compile attempt owns one arena for its closure plans. It collects the
//! plan of the root lambda (and of every nested lambda), compiles nested units
//! bottom-up, emits the root unit and binds it to its closure record.

use alloc::rc::Rc;

use bumpalo::Bump;
use tracing::{debug, trace};

use super::closure_info::{ClosureInfo, ClosureStatus, Session};
use super::collector::collect;
use super::emitter::Emitter;
use super::error::{CompileError, Failure, PassResult, Unsupported};
use super::nested::{compile_nested_units, record_values};
use crate::{
    Vec,
    ast::LambdaExpr,
    evaluator::ExecutionError,
    values::{Function, Value},
    vm::{BytecodeClosure, ClosureRecord, Code},
};

/// Outcome of a fast-path attempt.
#[derive(Debug)]
pub enum FastPath {
    Compiled(CompiledLambda),
    /// The tree uses a construct the compiler does not specialize; evaluate
    /// it instead.
    Unsupported(Unsupported),
}

/// A root lambda compiled to bytecode and bound to its closure record.
#[derive(Debug, Clone)]
pub struct CompiledLambda {
    closure: Rc<BytecodeClosure>,
}

impl CompiledLambda {
    pub fn invoke(&self, args: &[Value]) -> Result<Value, ExecutionError> {
        self.closure.call(args)
    }

    pub fn code(&self) -> &Code {
        self.closure.code()
    }

    pub fn record(&self) -> &ClosureRecord {
        self.closure.record()
    }

    pub fn into_function(self) -> Rc<dyn Function> {
        self.closure
    }
}

/// Compiles `lambda`, reporting constructs the compiler declines as
/// [`FastPath::Unsupported`].
pub fn try_compile(lambda: &Rc<LambdaExpr>) -> Result<FastPath, CompileError> {
    let arena = Bump::new();
    let outcome = compile_root(&arena, lambda);
    trace!(arena_bytes = arena.allocated_bytes(), "Compile session finished");
    finish(lambda, outcome)
}

/// Compiles `lambda` with no fallback: `None` when the tree uses an
/// unsupported construct.
pub fn compile_fast(lambda: &Rc<LambdaExpr>) -> Result<Option<CompiledLambda>, CompileError> {
    Ok(match try_compile(lambda)? {
        FastPath::Compiled(compiled) => Some(compiled),
        FastPath::Unsupported(_) => None,
    })
}

/// Compiles `lambda` against a closure record supplied by the caller. The
/// collector does not run: every identity constant must be one of
/// `constants`, and the tree may contain neither labels nor nested lambdas.
pub fn compile_with_closure(
    lambda: &Rc<LambdaExpr>,
    constants: Vec<Value>,
) -> Result<FastPath, CompileError> {
    let arena = Bump::new();
    let session = Session::new(&arena);
    let mut info = ClosureInfo::new(&arena, ClosureStatus::USER_SUPPLIED);
    let outcome = Emitter::new(&session, &mut info, lambda, Some(&constants)).compile();
    finish(lambda, outcome.map(|code| bind(code, constants)))
}

fn compile_root(arena: &Bump, lambda: &Rc<LambdaExpr>) -> PassResult<CompiledLambda> {
    let mut session = Session::new(arena);
    let mut info = collect(&mut session, lambda, false)?;
    trace!(
        units = session.units.len(),
        constants = info.constants.len(),
        "Collected closure plan"
    );
    compile_nested_units(&mut session)?;
    let code = Emitter::new(&session, &mut info, lambda, None).compile()?;
    let values = record_values(&session, &info)?;
    Ok(bind(code, values))
}

fn bind(code: Code, values: Vec<Value>) -> CompiledLambda {
    trace!(
        instructions = code.instructions.len(),
        locals = code.num_locals,
        max_stack = code.max_stack_size,
        record = values.len(),
        "Emitted root unit"
    );
    CompiledLambda {
        closure: Rc::new(BytecodeClosure::new(
            Rc::new(code),
            ClosureRecord::from_constants(values),
        )),
    }
}

fn finish(
    lambda: &LambdaExpr,
    outcome: PassResult<CompiledLambda>,
) -> Result<FastPath, CompileError> {
    match outcome {
        Ok(compiled) => {
            debug!(name = lambda.display_name(), "Compiled to bytecode");
            Ok(FastPath::Compiled(compiled))
        }
        Err(Failure::Unsupported(reason)) => {
            debug!(name = lambda.display_name(), %reason, "Fast path declined");
            Ok(FastPath::Unsupported(reason))
        }
        Err(Failure::Error(error)) => {
            debug!(name = lambda.display_name(), %error, "Compilation failed");
            Err(error)
        }
    }
}
