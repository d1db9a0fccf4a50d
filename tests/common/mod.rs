//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::rc::Rc;

use vellum::{
    CompilationOptions, ExecutionError, ExecutionOptions, Function, LambdaExpr, Value, compiler,
    evaluator,
};

/// Enables tracing output for a test (`RUST_LOG` overrides the level).
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// The bytecode form of `lambda`; panics when the compiler declines it.
pub fn compiled(lambda: &Rc<LambdaExpr>) -> Rc<dyn Function> {
    compiler::compile_fast(lambda)
        .unwrap_or_else(|e| panic!("{} failed to compile: {}", lambda.display_name(), e))
        .unwrap_or_else(|| panic!("{} was declined by the compiler", lambda.display_name()))
        .into_function()
}

/// The evaluator form of `lambda`.
pub fn interpreted(lambda: &Rc<LambdaExpr>) -> Rc<dyn Function> {
    evaluator::interpret(lambda, &ExecutionOptions::default())
}

/// Whatever `compile` returns with default options.
pub fn compile_default(lambda: &Rc<LambdaExpr>) -> Rc<dyn Function> {
    vellum::compile(lambda, &CompilationOptions::default())
        .expect("compile failed")
        .expect("no callable produced")
}

/// A comparable rendering of a call result.
///
/// Arrays and instances render structurally. Runtime exceptions keep only
/// their kind, since messages are not part of the contract.
pub fn outcome(result: Result<Value, ExecutionError>) -> String {
    match result {
        Ok(value) => format!("{:?}", value),
        Err(ExecutionError::Thrown(Value::Exception(e))) => format!("throw {:?}", e.kind),
        Err(ExecutionError::Thrown(value)) => format!("throw {:?}", value),
        Err(ExecutionError::ResourceExceeded(_)) => "resource exceeded".to_string(),
        Err(ExecutionError::InvalidArguments { expected, got }) => {
            format!("invalid arguments ({} for {})", got, expected)
        }
        Err(ExecutionError::InvalidJump { label }) => format!("invalid jump to {}", label),
        Err(ExecutionError::Internal(message)) => panic!("internal error: {}", message),
    }
}

/// Runs `lambda` on both execution paths and checks they agree on every
/// input. Returns the outcomes.
pub fn assert_paths_agree(lambda: &Rc<LambdaExpr>, inputs: &[Vec<Value>]) -> Vec<String> {
    let fast = compiled(lambda);
    let slow = interpreted(lambda);
    inputs
        .iter()
        .map(|args| {
            let expected = outcome(slow.call(args));
            let actual = outcome(fast.call(args));
            pretty_assertions::assert_eq!(
                actual,
                expected,
                "{} disagrees on {:?}",
                lambda.display_name(),
                args
            );
            actual
        })
        .collect()
}

/// Items of an array value.
pub fn elements(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.borrow().clone(),
        other => panic!("expected an array, got {:?}", other),
    }
}

pub fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().map(|&n| Value::I32(n)).collect()
}
