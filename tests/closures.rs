//! Closures over variables, constants and nested lambdas.

mod common;

use common::{compiled, elements, ints};
use pretty_assertions::assert_eq;
use vellum::{Type, Value, ast::builder as b, compiler};

#[test]
fn counter_shares_its_cell_with_the_owner() {
    common::init_logging();
    let count = b::param("count", Type::I32);
    let step = b::lambda(
        Some("step"),
        &[],
        &b::pre_increment_assign(&b::var(&count)).unwrap(),
    );
    let f = b::param("f", Type::Function(step.signature.clone()));
    let call = b::invoke(&b::var(&f), &[]).unwrap();
    let body = b::block(
        &[count.clone(), f.clone()],
        &[
            b::assign(&b::var(&count), &b::int(0)).unwrap(),
            b::assign(&b::var(&f), &b::lambda_expr(&step)).unwrap(),
            b::new_array(Type::I32, &[call.clone(), call, b::var(&count)]).unwrap(),
        ],
    );
    let program = compiled(&b::lambda(Some("counter"), &[], &body));

    let result = program.call(&[]).unwrap();
    assert_eq!(elements(&result), ints(&[1, 2, 2]));
}

#[test]
fn returned_closure_outlives_its_frame() {
    let start = b::param("start", Type::I32);
    let step = b::lambda(
        Some("step"),
        &[],
        &b::pre_increment_assign(&b::var(&start)).unwrap(),
    );
    let make = compiled(&b::lambda(Some("make"), &[start], &b::lambda_expr(&step)));

    let Value::Function(first) = make.call(&ints(&[0])).unwrap() else {
        panic!("expected a function");
    };
    let Value::Function(second) = make.call(&ints(&[100])).unwrap() else {
        panic!("expected a function");
    };
    assert_eq!(first.call(&[]).unwrap(), Value::I32(1));
    assert_eq!(first.call(&[]).unwrap(), Value::I32(2));
    assert_eq!(second.call(&[]).unwrap(), Value::I32(101));
    assert_eq!(first.call(&[]).unwrap(), Value::I32(3));
}

#[test]
fn capture_through_two_levels() {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let innermost = b::lambda(
        Some("innermost"),
        &[y.clone()],
        &b::multiply(&b::var(&x), &b::var(&y)).unwrap(),
    );
    let middle = b::lambda(
        Some("middle"),
        &[],
        &b::invoke(&b::lambda_expr(&innermost), &[b::int(3)]).unwrap(),
    );
    let root = b::lambda(
        Some("root"),
        &[x],
        &b::invoke(&b::lambda_expr(&middle), &[]).unwrap(),
    );

    assert_eq!(compiled(&root).call(&ints(&[7])).unwrap(), Value::I32(21));
}

#[test]
fn nested_lambda_without_captures_is_bound_once() {
    let n = b::param("n", Type::I32);
    let square = b::lambda(
        Some("square"),
        &[n.clone()],
        &b::multiply(&b::var(&n), &b::var(&n)).unwrap(),
    );
    let x = b::param("x", Type::I32);
    let target = b::lambda_expr(&square);
    let body = b::add(
        &b::invoke(&target, &[b::var(&x)]).unwrap(),
        &b::invoke(&target, &[b::int(2)]).unwrap(),
    )
    .unwrap();
    let f = compiler::compile_fast(&b::lambda(None, &[x], &body))
        .unwrap()
        .unwrap();

    assert_eq!(f.invoke(&ints(&[3])).unwrap(), Value::I32(13));
    assert_eq!(f.record().constants().len(), 1);
}

#[test]
fn shared_constant_is_one_record_slot() {
    let table = Value::array(ints(&[5, 6, 7]));
    let items = b::constant(table.clone(), Type::array(Type::I32));
    let i = b::param("i", Type::I32);
    let body = b::add(
        &b::index(&items, &[b::var(&i)]).unwrap(),
        &b::array_length(&items).unwrap(),
    )
    .unwrap();
    let f = compiler::compile_fast(&b::lambda(None, &[i], &body))
        .unwrap()
        .unwrap();

    assert_eq!(f.record().constants().len(), 1);
    assert_eq!(f.record().constants()[0], table);
    assert_eq!(f.invoke(&ints(&[2])).unwrap(), Value::I32(10));
}

#[test]
fn mutation_of_captured_constant_is_visible() {
    let table = Value::array(ints(&[1]));
    let items = b::constant(table.clone(), Type::array(Type::I32));
    let body = b::assign(&b::index(&items, &[b::int(0)]).unwrap(), &b::int(9)).unwrap();
    let f = compiled(&b::lambda(None, &[], &body));

    assert_eq!(f.call(&[]).unwrap(), Value::I32(9));
    assert_eq!(elements(&table), ints(&[9]));
}
