//! Tests for bytecode emission.

use super::{CompiledLambda, compile_fast};
use crate::{
    ast::{LambdaExpr, builder as b},
    evaluator::ArithOp,
    types::{NumKind, Type},
    values::Value,
    vec,
    vm::{HandlerKind, Instruction},
};
use alloc::rc::Rc;
use pretty_assertions::assert_eq;

fn compiled(lambda: &Rc<LambdaExpr>) -> CompiledLambda {
    compile_fast(lambda)
        .expect("compilation failed")
        .expect("fast path declined")
}

#[test]
fn test_add_parameters() {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let body = b::add(&b::var(&x), &b::var(&y)).unwrap();
    let compiled = compiled(&b::lambda(Some("add"), &[x, y], &body));
    let code = compiled.code();

    assert_eq!(
        code.instructions,
        vec![
            Instruction::LoadLocal(0),
            Instruction::LoadLocal(1),
            Instruction::Arith(ArithOp::Add, NumKind::I32),
            Instruction::Return,
        ]
    );
    assert_eq!(code.max_stack_size, 2);
    assert_eq!(code.num_locals, 2);
}

#[test]
fn test_conditional_jumps_over_branches() {
    let flag = b::param("flag", Type::Bool);
    let body = b::condition(&b::var(&flag), &b::string("yes"), &b::string("no")).unwrap();
    let compiled = compiled(&b::lambda(None, &[flag], &body));
    let code = compiled.code();

    assert_eq!(
        code.instructions,
        vec![
            Instruction::LoadLocal(0),
            Instruction::JumpIfFalse(4),
            Instruction::ConstLiteral(0),
            Instruction::Jump(5),
            Instruction::ConstLiteral(1),
            Instruction::Return,
        ]
    );
    assert_eq!(code.literals, vec![Value::str("yes"), Value::str("no")]);
}

#[test]
fn test_literals_are_deduplicated_by_value() {
    let x = b::param("x", Type::F64);
    let scaled = b::multiply(&b::var(&x), &b::float(1.5)).unwrap();
    let body = b::add(&scaled, &b::float(1.5)).unwrap();
    let compiled = compiled(&b::lambda(None, &[x], &body));
    let code = compiled.code();

    assert_eq!(code.literals, vec![Value::F64(1.5)]);
}

#[test]
fn test_small_integers_are_immediates() {
    let body = b::add(&b::int(40), &b::int(2)).unwrap();
    let compiled = compiled(&b::lambda(None, &[], &body));
    let code = compiled.code();

    assert!(code.literals.is_empty());
    assert_eq!(code.instructions[0], Instruction::ConstI32(40));
}

#[test]
fn test_constant_operand_is_converted_at_compile_time() {
    let x = b::param("x", Type::I64);
    let body = b::add(&b::var(&x), &b::int(1)).unwrap();
    let compiled = compiled(&b::lambda(None, &[x], &body));
    let code = compiled.code();

    assert_eq!(code.literals, vec![Value::I64(1)]);
    assert!(!code.instructions.iter().any(|i| matches!(i, Instruction::Convert(_))));
}

#[test]
fn test_repeated_identity_constant_is_hoisted() {
    let items = b::constant(Value::array(vec![Value::I32(3)]), Type::array(Type::I32));
    let body = b::add(
        &b::array_length(&items).unwrap(),
        &b::index(&items, &[b::int(0)]).unwrap(),
    )
    .unwrap();
    let compiled = compiled(&b::lambda(None, &[], &body));
    let code = compiled.code();

    assert_eq!(
        &code.instructions[..2],
        &[Instruction::LoadConstant(0), Instruction::StoreLocal(0)]
    );
    let loads = code
        .instructions
        .iter()
        .filter(|i| matches!(i, Instruction::LoadConstant(_)))
        .count();
    assert_eq!(loads, 1);
}

#[test]
fn test_void_lambda_discards_body() {
    let x = b::param("x", Type::I32);
    let body = b::add(&b::var(&x), &b::int(1)).unwrap();
    let lambda = b::lambda_typed(None, &[x], &body, Type::Void).unwrap();
    let compiled = compiled(&lambda);
    let code = compiled.code();

    assert_eq!(
        &code.instructions[code.instructions.len() - 2..],
        &[Instruction::ConstUnit, Instruction::Return]
    );
    assert!(code.instructions.contains(&Instruction::Pop));
}

#[test]
fn test_try_finally_handler_table() {
    let x = b::param("x", Type::I32);
    let body = b::try_finally(&b::var(&x), &b::default(Type::Void)).unwrap();
    let compiled = compiled(&b::lambda(None, &[x], &body));
    let code = compiled.code();

    assert_eq!(code.handlers.len(), 1);
    assert!(matches!(code.handlers[0].kind, HandlerKind::Finally { .. }));
    // The region never starts at a position a preceding label can name.
    let start = code.handlers[0].try_start as usize;
    assert_eq!(code.instructions[start - 1], Instruction::Nop);
    assert!(code.instructions.contains(&Instruction::EndFinally));
    assert!(
        code.instructions
            .iter()
            .any(|i| matches!(i, Instruction::Leave(_)))
    );
}

#[test]
fn test_catch_handlers_keep_source_order() {
    let body = b::try_catch(
        &b::throw_as(&b::constant(Value::str("boom"), Type::Str), Type::I32),
        vec![
            b::catch(Type::Str, None, &b::int(1)),
            b::catch(Type::Object, None, &b::int(2)),
        ],
    )
    .unwrap();
    let compiled = compiled(&b::lambda(None, &[], &body));
    let code = compiled.code();

    let tests: Vec<_> = code
        .handlers
        .iter()
        .map(|handler| match &handler.kind {
            HandlerKind::Catch { test, .. } => test.clone(),
            other => panic!("unexpected handler {:?}", other),
        })
        .collect();
    assert_eq!(tests, vec![Type::Str, Type::Object]);
}

#[test]
fn test_listing_labels_jump_targets() {
    let flag = b::param("flag", Type::Bool);
    let body = b::condition(&b::var(&flag), &b::int(1), &b::int(2)).unwrap();
    let compiled = compiled(&b::lambda(Some("pick"), &[flag], &body));
    let code = compiled.code();

    let listing = format!("{:?}", code);
    assert!(listing.contains("name: pick"));
    assert!(listing.contains("JumpIfFalse(4) (to L0)"));
    assert!(listing.contains("L1:"));
}

#[test]
fn test_open_nested_unit_is_curried() {
    let counter = b::param("counter", Type::I32);
    let inner = b::lambda(None, &[], &b::var(&counter));
    let body = b::invoke(&b::lambda_expr(&inner), &[]).unwrap();
    let compiled = compiled(&b::lambda(None, &[counter], &body));
    let code = compiled.code();

    // The parameter moves into a cell before the unit is bound to it.
    assert_eq!(
        &code.instructions[..2],
        &[Instruction::LoadLocal(0), Instruction::NewCell(0)]
    );
    assert!(code.instructions.contains(&Instruction::Curry(1)));
}

#[test]
fn test_curry_takes_one_cell_per_capture() {
    let a = b::param("a", Type::I32);
    let c = b::param("c", Type::I32);
    let inner = b::lambda(None, &[], &b::subtract(&b::var(&a), &b::var(&c)).unwrap());
    let body = b::invoke(&b::lambda_expr(&inner), &[]).unwrap();
    let compiled = compiled(&b::lambda(None, &[a, c], &body));

    assert!(compiled.code().instructions.contains(&Instruction::Curry(2)));
    assert_eq!(
        compiled.invoke(&[Value::I32(9), Value::I32(4)]).unwrap(),
        Value::I32(5)
    );
}
