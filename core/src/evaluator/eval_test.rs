//! Unit tests for the evaluator.

use super::*;
use crate::{
    Vec,
    ast::{ExprRef, builder as b},
    types::{MethodDef, StructDef, Type},
    values::{ExceptionKind, Value},
    vec,
};
use pretty_assertions::assert_eq;

fn run(lambda: &Rc<LambdaExpr>, args: &[Value]) -> Result<Value, ExecutionError> {
    interpret(lambda, &ExecutionOptions::default()).call(args)
}

fn eval(body: &ExprRef) -> Result<Value, ExecutionError> {
    run(&b::lambda(None, &[], body), &[])
}

fn exception_kind(result: Result<Value, ExecutionError>) -> ExceptionKind {
    match result {
        Err(ExecutionError::Thrown(Value::Exception(e))) => e.kind.clone(),
        other => panic!("expected a runtime exception, got {:?}", other),
    }
}

fn elements(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.borrow().clone(),
        other => panic!("expected an array, got {:?}", other),
    }
}

fn point(kind: fn(&str) -> crate::types::StructDefBuilder) -> Rc<StructDef> {
    kind("Point")
        .field("x", Type::I32)
        .field("y", Type::I32)
        .build()
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_add_parameters() {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let body = b::add(&b::var(&x), &b::var(&y)).unwrap();
    let add = b::lambda(None, &[x, y], &body);

    assert_eq!(run(&add, &[Value::I32(2), Value::I32(3)]).unwrap(), Value::I32(5));
    assert_eq!(run(&add, &[Value::I32(-1), Value::I32(1)]).unwrap(), Value::I32(0));
}

#[test]
fn test_conditional() {
    let flag = b::param("flag", Type::Bool);
    let body = b::condition(&b::var(&flag), &b::string("yes"), &b::string("no")).unwrap();
    let pick = b::lambda(None, &[flag], &body);

    assert_eq!(run(&pick, &[Value::Bool(true)]).unwrap(), Value::str("yes"));
    assert_eq!(run(&pick, &[Value::Bool(false)]).unwrap(), Value::str("no"));
}

#[test]
fn test_integer_division_by_zero() {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let body = b::divide(&b::var(&x), &b::var(&y)).unwrap();
    let div = b::lambda(None, &[x, y], &body);

    assert_eq!(
        exception_kind(run(&div, &[Value::I32(1), Value::I32(0)])),
        ExceptionKind::DivideByZero
    );
}

#[test]
fn test_lifted_arithmetic_propagates_null() {
    let x = b::param("x", Type::nullable(Type::I32));
    let body = b::add(&b::var(&x), &b::int(1)).unwrap();
    let inc = b::lambda(None, &[x], &body);

    assert_eq!(run(&inc, &[Value::Null]).unwrap(), Value::Null);
    assert_eq!(run(&inc, &[Value::I32(2)]).unwrap(), Value::I32(3));
}

#[test]
fn test_coalesce() {
    let s = b::param("s", Type::Str);
    let body = b::coalesce(&b::var(&s), &b::string("none")).unwrap();
    let f = b::lambda(None, &[s], &body);

    assert_eq!(run(&f, &[Value::Null]).unwrap(), Value::str("none"));
    assert_eq!(run(&f, &[Value::str("a")]).unwrap(), Value::str("a"));
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let nonzero = b::not_equal(&b::var(&y), &b::int(0)).unwrap();
    let quotient = b::divide(&b::var(&x), &b::var(&y)).unwrap();
    let big = b::greater_than(&quotient, &b::int(2)).unwrap();
    let body = b::and_also(&nonzero, &big).unwrap();
    let f = b::lambda(None, &[x, y], &body);

    assert_eq!(run(&f, &[Value::I32(1), Value::I32(0)]).unwrap(), Value::Bool(false));
    assert_eq!(run(&f, &[Value::I32(9), Value::I32(3)]).unwrap(), Value::Bool(true));
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn test_captured_counter_is_shared() {
    let counter = b::param("counter", Type::I32);
    let step = b::lambda(
        Some("step"),
        &[],
        &b::pre_increment_assign(&b::var(&counter)).unwrap(),
    );
    let f = b::param("f", Type::Function(step.signature.clone()));
    let call = b::invoke(&b::var(&f), &[]).unwrap();
    let body = b::block(
        &[counter.clone(), f.clone()],
        &[
            b::assign(&b::var(&counter), &b::int(0)).unwrap(),
            b::assign(&b::var(&f), &b::lambda_expr(&step)).unwrap(),
            b::new_array(Type::I32, &[call.clone(), call, b::var(&counter)]).unwrap(),
        ],
    );

    let result = eval(&body).unwrap();
    assert_eq!(
        elements(&result),
        vec![Value::I32(1), Value::I32(2), Value::I32(2)]
    );
}

#[test]
fn test_recursion_is_bounded() {
    let n = b::param("n", Type::I32);
    let self_ty = Type::function(vec![Type::I32], Type::I32);
    let f = b::param("f", self_ty);
    let recurse = b::lambda(
        Some("recurse"),
        &[n.clone()],
        &b::invoke(&b::var(&f), &[b::var(&n)]).unwrap(),
    );
    let body = b::block(
        &[f.clone()],
        &[
            b::assign(&b::var(&f), &b::lambda_expr(&recurse)).unwrap(),
            b::invoke(&b::var(&f), &[b::int(1)]).unwrap(),
        ],
    );
    let options = ExecutionOptions { max_depth: 64 };
    let result = interpret(&b::lambda(None, &[], &body), &options).call(&[]);

    assert!(matches!(
        result,
        Err(ExecutionError::ResourceExceeded(
            ResourceExceededError::StackOverflow { max_depth: 64, .. }
        ))
    ));
}

#[test]
fn test_argument_count_is_checked() {
    let x = b::param("x", Type::I32);
    let identity = b::lambda(None, &[x.clone()], &b::var(&x));

    assert!(matches!(
        run(&identity, &[]),
        Err(ExecutionError::InvalidArguments {
            expected: 1,
            got: 0
        })
    ));
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_loop_with_break_value() {
    let i = b::param("i", Type::I32);
    let sum = b::param("sum", Type::I32);
    let done = b::label_target("done", Type::I32);
    let exit = b::if_then(
        &b::greater_than(&b::var(&i), &b::int(4)).unwrap(),
        &b::break_to(&done, Some(&b::var(&sum))).unwrap(),
    )
    .unwrap();
    let step = b::block(
        &[],
        &[
            exit,
            b::add_assign(&b::var(&sum), &b::var(&i)).unwrap(),
            b::pre_increment_assign(&b::var(&i)).unwrap(),
        ],
    );
    let body = b::block(
        &[i.clone(), sum.clone()],
        &[
            b::assign(&b::var(&i), &b::int(1)).unwrap(),
            b::loop_expr(&step, Some(&done), None).unwrap(),
        ],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(10));
}

#[test]
fn test_loop_continue_skips_rest_of_body() {
    let i = b::param("i", Type::I32);
    let odd = b::param("odd", Type::I32);
    let done = b::label_target("done", Type::I32);
    let next = b::label_target("next", Type::Void);
    let step = b::block(
        &[],
        &[
            b::pre_increment_assign(&b::var(&i)).unwrap(),
            b::if_then(
                &b::greater_than(&b::var(&i), &b::int(6)).unwrap(),
                &b::break_to(&done, Some(&b::var(&odd))).unwrap(),
            )
            .unwrap(),
            b::if_then(
                &b::equal(&b::modulo(&b::var(&i), &b::int(2)).unwrap(), &b::int(0)).unwrap(),
                &b::continue_to(&next).unwrap(),
            )
            .unwrap(),
            b::pre_increment_assign(&b::var(&odd)).unwrap(),
        ],
    );
    let body = b::block(
        &[i.clone(), odd.clone()],
        &[b::loop_expr(&step, Some(&done), Some(&next)).unwrap()],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(3));
}

#[test]
fn test_goto_skips_forward() {
    let x = b::param("x", Type::I32);
    let skip = b::label_target("skip", Type::Void);
    let body = b::block(
        &[x.clone()],
        &[
            b::assign(&b::var(&x), &b::int(1)).unwrap(),
            b::goto(&skip).unwrap(),
            b::assign(&b::var(&x), &b::int(99)).unwrap(),
            b::label(&skip, None).unwrap(),
            b::var(&x),
        ],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(1));
}

#[test]
fn test_return_label_carries_value() {
    let ret = b::label_target("ret", Type::I32);
    let body = b::block(
        &[],
        &[
            b::return_to(&ret, Some(&b::int(7))).unwrap(),
            b::label(&ret, Some(&b::int(0))).unwrap(),
        ],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(7));
}

#[test]
fn test_switch_takes_first_match() {
    let n = b::param("n", Type::I32);
    let cases = vec![
        b::switch_case(&[b::int(1)], &b::string("a")),
        b::switch_case(&[b::int(1), b::int(2)], &b::string("b")),
    ];
    let body = b::switch(Type::Str, &b::var(&n), cases, Some(&b::string("z")), None).unwrap();
    let f = b::lambda(None, &[n], &body);

    assert_eq!(run(&f, &[Value::I32(1)]).unwrap(), Value::str("a"));
    assert_eq!(run(&f, &[Value::I32(2)]).unwrap(), Value::str("b"));
    assert_eq!(run(&f, &[Value::I32(3)]).unwrap(), Value::str("z"));
}

#[test]
fn test_valued_switch_without_match_raises() {
    let n = b::param("n", Type::I32);
    let cases = vec![b::switch_case(&[b::int(1)], &b::string("one"))];
    let body = b::switch(Type::Str, &b::var(&n), cases, None, None).unwrap();
    let f = b::lambda(None, &[n], &body);

    assert_eq!(run(&f, &[Value::I32(1)]).unwrap(), Value::str("one"));
    assert_eq!(
        exception_kind(run(&f, &[Value::I32(5)])),
        ExceptionKind::InvalidOperation
    );
}

#[test]
fn test_void_switch_without_match_does_nothing() {
    let n = b::param("n", Type::I32);
    let cases = vec![b::switch_case(&[b::int(1)], &b::default(Type::Void))];
    let body = b::switch(Type::Void, &b::var(&n), cases, None, None).unwrap();
    let f = b::lambda(None, &[n], &body);

    assert_eq!(run(&f, &[Value::I32(5)]).unwrap(), Value::Unit);
}

// ============================================================================
// Exceptions
// ============================================================================

fn finally_counter(protected: impl Fn(&ExprRef) -> ExprRef) -> Value {
    let count = b::param("count", Type::I32);
    let bump = b::pre_increment_assign(&b::var(&count)).unwrap();
    let body = b::block(
        &[count.clone()],
        &[
            b::try_catch(&protected(&bump), vec![b::catch(Type::Object, None, &b::int(0))])
                .unwrap(),
            b::var(&count),
        ],
    );
    eval(&body).unwrap()
}

#[test]
fn test_finally_runs_once_on_normal_exit() {
    let count = finally_counter(|bump| b::try_finally(&b::int(5), bump).unwrap());
    assert_eq!(count, Value::I32(1));
}

#[test]
fn test_finally_runs_once_on_exception() {
    let count = finally_counter(|bump| {
        b::try_finally(&b::throw_as(&b::string("boom"), Type::I32), bump).unwrap()
    });
    assert_eq!(count, Value::I32(1));
}

#[test]
fn test_fault_runs_only_on_exception() {
    let quiet = finally_counter(|bump| b::try_fault(&b::int(5), bump).unwrap());
    let thrown = finally_counter(|bump| {
        b::try_fault(&b::throw_as(&b::string("boom"), Type::I32), bump).unwrap()
    });

    assert_eq!(quiet, Value::I32(0));
    assert_eq!(thrown, Value::I32(1));
}

#[test]
fn test_first_matching_catch_wins() {
    let body = b::try_catch(
        &b::throw_as(&b::string("boom"), Type::I32),
        vec![
            b::catch(Type::Exception, None, &b::int(1)),
            b::catch(Type::Str, None, &b::int(2)),
            b::catch(Type::Object, None, &b::int(3)),
        ],
    )
    .unwrap();

    assert_eq!(eval(&body).unwrap(), Value::I32(2));
}

#[test]
fn test_filter_can_decline() {
    let body = b::try_catch(
        &b::throw_as(&b::string("boom"), Type::I32),
        vec![
            b::catch_when(Type::Object, None, &b::boolean(false), &b::int(1)).unwrap(),
            b::catch(Type::Object, None, &b::int(2)),
        ],
    )
    .unwrap();

    assert_eq!(eval(&body).unwrap(), Value::I32(2));
}

#[test]
fn test_rethrow_reaches_outer_handler() {
    let e = b::param("e", Type::Str);
    let inner = b::try_catch(
        &b::throw_as(&b::string("inner"), Type::Str),
        vec![b::catch(
            Type::Object,
            None,
            &b::block(&[], &[b::rethrow(), b::string("unused")]),
        )],
    )
    .unwrap();
    let body = b::try_catch(&inner, vec![b::catch(Type::Str, Some(&e), &b::var(&e))]).unwrap();

    assert_eq!(eval(&body).unwrap(), Value::str("inner"));
}

#[test]
fn test_rethrow_outside_catch() {
    let body = b::block(&[], &[b::rethrow(), b::int(0)]);
    assert_eq!(exception_kind(eval(&body)), ExceptionKind::InvalidOperation);
}

#[test]
fn test_uncaught_throw_surfaces_value() {
    let result = eval(&b::throw_as(&b::string("boom"), Type::I32));
    assert!(matches!(result, Err(ExecutionError::Thrown(Value::Str(s))) if &*s == "boom"));
}

// ============================================================================
// Arrays and members
// ============================================================================

#[test]
fn test_array_index_out_of_range() {
    let items = b::new_array(Type::I32, &[b::int(1), b::int(2)]).unwrap();
    let body = b::index(&items, &[b::int(5)]).unwrap();

    assert_eq!(exception_kind(eval(&body)), ExceptionKind::IndexOutOfRange);
}

#[test]
fn test_negative_array_length() {
    let body = b::new_array_bounds(Type::I32, &b::int(-1)).unwrap();
    assert_eq!(exception_kind(eval(&body)), ExceptionKind::Argument);
}

#[test]
fn test_value_struct_is_copied_on_assignment() {
    let def = point(StructDef::value);
    let p = b::param("p", def.ty());
    let q = b::param("q", def.ty());
    let body = b::block(
        &[p.clone(), q.clone()],
        &[
            b::assign(&b::var(&p), &b::new(&def, &[b::int(1), b::int(2)]).unwrap()).unwrap(),
            b::assign(&b::var(&q), &b::var(&p)).unwrap(),
            b::assign(&b::member(&b::var(&q), "x").unwrap(), &b::int(9)).unwrap(),
            b::member(&b::var(&p), "x").unwrap(),
        ],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(1));
}

#[test]
fn test_class_instances_are_shared() {
    let def = point(StructDef::class);
    let p = b::param("p", def.ty());
    let q = b::param("q", def.ty());
    let body = b::block(
        &[p.clone(), q.clone()],
        &[
            b::assign(&b::var(&p), &b::new(&def, &[b::int(1), b::int(2)]).unwrap()).unwrap(),
            b::assign(&b::var(&q), &b::var(&p)).unwrap(),
            b::assign(&b::member(&b::var(&q), "x").unwrap(), &b::int(9)).unwrap(),
            b::member(&b::var(&p), "x").unwrap(),
        ],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(9));
}

#[test]
fn test_null_receiver_raises() {
    let def = point(StructDef::class);
    let p = b::param("p", def.ty());
    let body = b::block(&[p.clone()], &[b::member(&b::var(&p), "y").unwrap()]);

    assert_eq!(exception_kind(eval(&body)), ExceptionKind::NullReference);
}

fn bump(receiver: Option<&mut Value>, _args: &[Value]) -> Result<Value, ExecutionError> {
    let Some(this) = receiver else {
        return Err(ExecutionError::internal("bump needs a receiver"));
    };
    let n = this.field(0)?.as_i32().unwrap_or_default();
    this.set_field(0, Value::I32(n + 1))?;
    Ok(Value::Unit)
}

#[test]
fn test_mutating_method_updates_variable() {
    let def = StructDef::value("Tally").field("n", Type::I32).build();
    let method = def.add_method(
        MethodDef::new_instance("bump", Vec::new(), Type::Void, bump).with_mutating_receiver(),
    );
    let t = b::param("t", def.ty());
    let call = b::call_method(&b::var(&t), &method, &[]).unwrap();
    let body = b::block(
        &[t.clone()],
        &[call.clone(), call, b::member(&b::var(&t), "n").unwrap()],
    );

    assert_eq!(eval(&body).unwrap(), Value::I32(2));
}

#[test]
fn test_member_init_assigns_in_order() {
    let def = point(StructDef::value);
    let body = b::member_init(&def, &[], &[("y", b::int(4)), ("x", b::int(3))]).unwrap();
    let sum = b::add(
        &b::member(&body, "x").unwrap(),
        &b::member(&body, "y").unwrap(),
    )
    .unwrap();

    assert_eq!(eval(&sum).unwrap(), Value::I32(7));
}
