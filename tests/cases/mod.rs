//! Programs run on both execution paths by the differential tests.
#![allow(dead_code)]

use std::rc::Rc;

use once_cell::sync::Lazy;
use vellum::{
    ExecutionError, LambdaExpr, MethodDef, StructDef, Type, Value, ast::builder as b,
};

pub struct Case {
    pub name: &'static str,
    pub program: fn() -> Rc<LambdaExpr>,
    pub inputs: fn() -> Vec<Vec<Value>>,
}

pub static CASES: Lazy<Vec<Case>> = Lazy::new(|| {
    vec![
        Case {
            name: "add_i32",
            program: add_i32,
            inputs: || {
                vec![
                    vec![Value::I32(2), Value::I32(3)],
                    vec![Value::I32(-1), Value::I32(1)],
                    vec![Value::I32(i32::MAX), Value::I32(1)],
                ]
            },
        },
        Case {
            name: "pick",
            program: pick,
            inputs: || vec![vec![Value::Bool(true)], vec![Value::Bool(false)]],
        },
        Case {
            name: "mixed_widths",
            program: mixed_widths,
            inputs: || {
                vec![
                    vec![Value::U8(200), Value::I64(3)],
                    vec![Value::U8(0), Value::I64(-7)],
                ]
            },
        },
        Case {
            name: "float_division",
            program: float_division,
            inputs: || {
                vec![
                    vec![Value::F64(1.0), Value::F64(4.0)],
                    vec![Value::F64(1.0), Value::F64(0.0)],
                    vec![Value::F64(0.0), Value::F64(0.0)],
                ]
            },
        },
        Case {
            name: "integer_division",
            program: integer_division,
            inputs: || {
                vec![
                    vec![Value::I32(17), Value::I32(5)],
                    vec![Value::I32(-17), Value::I32(5)],
                    vec![Value::I32(1), Value::I32(0)],
                ]
            },
        },
        Case {
            name: "bits",
            program: bits,
            inputs: || vec![vec![Value::I32(0b1011)], vec![Value::I32(-8)]],
        },
        Case {
            name: "narrowing",
            program: narrowing,
            inputs: || {
                vec![
                    vec![Value::F64(3.9)],
                    vec![Value::F64(-3.9)],
                    vec![Value::F64(300.0)],
                ]
            },
        },
        Case {
            name: "lifted_add",
            program: lifted_add,
            inputs: || vec![vec![Value::Null], vec![Value::I32(41)]],
        },
        Case {
            name: "unwrap_nullable",
            program: unwrap_nullable,
            inputs: || vec![vec![Value::Null], vec![Value::I32(5)]],
        },
        Case {
            name: "coalesce_greeting",
            program: coalesce_greeting,
            inputs: || vec![vec![Value::Null], vec![Value::str("Ada")]],
        },
        Case {
            name: "guarded_ratio",
            program: guarded_ratio,
            inputs: || {
                vec![
                    vec![Value::I32(9), Value::I32(0)],
                    vec![Value::I32(9), Value::I32(3)],
                    vec![Value::I32(9), Value::I32(2)],
                ]
            },
        },
        Case {
            name: "sum_to",
            program: sum_to,
            inputs: || {
                vec![
                    vec![Value::I32(0)],
                    vec![Value::I32(1)],
                    vec![Value::I32(10)],
                ]
            },
        },
        Case {
            name: "classify",
            program: classify,
            inputs: || (0..5).map(|n| vec![Value::I32(n)]).collect(),
        },
        Case {
            name: "string_switch",
            program: string_switch,
            inputs: || {
                vec![
                    vec![Value::str("a")],
                    vec![Value::str("c")],
                    vec![Value::str("z")],
                    vec![Value::Null],
                ]
            },
        },
        Case {
            name: "finally_count",
            program: finally_count,
            inputs: || vec![vec![Value::I32(4)], vec![Value::I32(-4)]],
        },
        Case {
            name: "rethrow",
            program: rethrow,
            inputs: || vec![vec![Value::Bool(true)], vec![Value::Bool(false)]],
        },
        Case {
            name: "array_fill",
            program: array_fill,
            inputs: || {
                vec![
                    vec![Value::I32(0)],
                    vec![Value::I32(4)],
                    vec![Value::I32(-1)],
                ]
            },
        },
        Case {
            name: "element_access",
            program: element_access,
            inputs: || (-1..4).map(|i| vec![Value::I32(i)]).collect(),
        },
        Case {
            name: "counter",
            program: counter,
            inputs: || vec![vec![]],
        },
        Case {
            name: "adder",
            program: adder,
            inputs: || vec![vec![Value::I32(1), Value::I32(2)]],
        },
        Case {
            name: "early_return",
            program: early_return,
            inputs: || vec![vec![Value::I32(3)], vec![Value::I32(30)]],
        },
        Case {
            name: "continue_through_finally",
            program: continue_through_finally,
            inputs: || vec![vec![Value::I32(0)], vec![Value::I32(3)]],
        },
        Case {
            name: "goto_before_try",
            program: goto_before_try,
            inputs: || vec![vec![Value::I32(0)], vec![Value::I32(3)]],
        },
        Case {
            name: "point_copy",
            program: point_copy,
            inputs: || vec![vec![Value::I32(9)]],
        },
        Case {
            name: "virtual_describe",
            program: virtual_describe,
            inputs: || vec![vec![Value::Bool(true)], vec![Value::Bool(false)]],
        },
        Case {
            name: "fahrenheit",
            program: fahrenheit,
            inputs: || vec![vec![Value::F64(212.0)], vec![Value::F64(32.0)]],
        },
        Case {
            name: "row_indexer",
            program: row_indexer,
            inputs: || (0..4).map(|i| vec![Value::I32(i)]).collect(),
        },
        Case {
            name: "tally",
            program: tally,
            inputs: || vec![vec![Value::I32(0)], vec![Value::I32(3)]],
        },
        Case {
            name: "throw_from_nested",
            program: throw_from_nested,
            inputs: || vec![vec![Value::I32(1)], vec![Value::I32(-1)]],
        },
    ]
});

// ============================================================================
// Operators
// ============================================================================

pub fn add_i32() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let body = b::add(&b::var(&x), &b::var(&y)).unwrap();
    b::lambda(Some("add_i32"), &[x, y], &body)
}

pub fn pick() -> Rc<LambdaExpr> {
    let flag = b::param("flag", Type::Bool);
    let body = b::condition(&b::var(&flag), &b::string("yes"), &b::string("no")).unwrap();
    b::lambda(Some("pick"), &[flag], &body)
}

fn mixed_widths() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::U8);
    let y = b::param("y", Type::I64);
    let product = b::multiply(&b::var(&x), &b::var(&y)).unwrap();
    let body = b::subtract(&product, &b::int(1)).unwrap();
    b::lambda(Some("mixed_widths"), &[x, y], &body)
}

fn float_division() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::F64);
    let y = b::param("y", Type::F64);
    let body = b::divide(&b::var(&x), &b::var(&y)).unwrap();
    b::lambda(Some("float_division"), &[x, y], &body)
}

fn integer_division() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let quotient = b::divide(&b::var(&x), &b::var(&y)).unwrap();
    let remainder = b::modulo(&b::var(&x), &b::var(&y)).unwrap();
    let body = b::new_array(Type::I32, &[quotient, remainder]).unwrap();
    b::lambda(Some("integer_division"), &[x, y], &body)
}

fn bits() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let items = [
        b::and(&b::var(&x), &b::int(0b110)).unwrap(),
        b::or(&b::var(&x), &b::int(0b100)).unwrap(),
        b::exclusive_or(&b::var(&x), &b::int(-1)).unwrap(),
        b::left_shift(&b::var(&x), &b::int(3)).unwrap(),
        b::right_shift(&b::var(&x), &b::int(1)).unwrap(),
        b::negate(&b::var(&x)).unwrap(),
        b::not(&b::var(&x)).unwrap(),
    ];
    let body = b::new_array(Type::I32, &items).unwrap();
    b::lambda(Some("bits"), &[x], &body)
}

fn narrowing() -> Rc<LambdaExpr> {
    let f = b::param("f", Type::F64);
    let items = [
        b::convert(&b::var(&f), Type::I32).unwrap(),
        b::convert(&b::convert(&b::var(&f), Type::I32).unwrap(), Type::U8)
            .and_then(|n| b::convert(&n, Type::I32))
            .unwrap(),
    ];
    let body = b::new_array(Type::I32, &items).unwrap();
    b::lambda(Some("narrowing"), &[f], &body)
}

fn lifted_add() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::nullable(Type::I32));
    let body = b::add(&b::var(&x), &b::int(1)).unwrap();
    b::lambda(Some("lifted_add"), &[x], &body)
}

fn unwrap_nullable() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::nullable(Type::I32));
    let body = b::convert(&b::var(&x), Type::I32).unwrap();
    b::lambda(Some("unwrap_nullable"), &[x], &body)
}

fn coalesce_greeting() -> Rc<LambdaExpr> {
    let name = b::param("name", Type::Str);
    let who = b::coalesce(&b::var(&name), &b::string("stranger")).unwrap();
    let body = b::add(&b::string("hello, "), &who).unwrap();
    b::lambda(Some("coalesce_greeting"), &[name], &body)
}

fn guarded_ratio() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let nonzero = b::not_equal(&b::var(&y), &b::int(0)).unwrap();
    let ratio = b::divide(&b::var(&x), &b::var(&y)).unwrap();
    let big = b::greater_than_or_equal(&ratio, &b::int(3)).unwrap();
    let body = b::and_also(&nonzero, &big).unwrap();
    let body = b::or_else(&b::equal(&b::var(&x), &b::int(0)).unwrap(), &body).unwrap();
    b::lambda(Some("guarded_ratio"), &[x, y], &body)
}

// ============================================================================
// Control flow
// ============================================================================

pub fn sum_to() -> Rc<LambdaExpr> {
    let n = b::param("n", Type::I32);
    let i = b::param("i", Type::I32);
    let sum = b::param("sum", Type::I32);
    let done = b::label_target("done", Type::I32);
    let step = b::block(
        &[],
        &[
            b::if_then(
                &b::greater_than(&b::var(&i), &b::var(&n)).unwrap(),
                &b::break_to(&done, Some(&b::var(&sum))).unwrap(),
            )
            .unwrap(),
            b::add_assign(&b::var(&sum), &b::var(&i)).unwrap(),
            b::post_increment_assign(&b::var(&i)).unwrap(),
        ],
    );
    let body = b::block(
        &[i.clone(), sum.clone()],
        &[
            b::assign(&b::var(&i), &b::int(1)).unwrap(),
            b::loop_expr(&step, Some(&done), None).unwrap(),
        ],
    );
    b::lambda(Some("sum_to"), &[n], &body)
}

fn classify() -> Rc<LambdaExpr> {
    let n = b::param("n", Type::I32);
    let cases = vec![
        b::switch_case(&[b::int(0)], &b::string("zero")),
        b::switch_case(&[b::int(1), b::int(2)], &b::string("small")),
        b::switch_case(&[b::int(2), b::int(3)], &b::string("shadowed")),
    ];
    let body = b::switch(
        Type::Str,
        &b::var(&n),
        cases,
        Some(&b::string("large")),
        None,
    )
    .unwrap();
    b::lambda(Some("classify"), &[n], &body)
}

fn string_switch() -> Rc<LambdaExpr> {
    let s = b::param("s", Type::Str);
    let cases = vec![
        b::switch_case(&[b::string("a")], &b::int(1)),
        b::switch_case(&[b::string("b"), b::string("c")], &b::int(2)),
    ];
    let body = b::switch(Type::I32, &b::var(&s), cases, Some(&b::int(0)), None).unwrap();
    b::lambda(Some("string_switch"), &[s], &body)
}

fn early_return() -> Rc<LambdaExpr> {
    let n = b::param("n", Type::I32);
    let ret = b::label_target("ret", Type::Str);
    let visits = b::param("visits", Type::I32);
    let protected = b::try_finally(
        &b::block(
            &[],
            &[
                b::if_then(
                    &b::less_than(&b::var(&n), &b::int(10)).unwrap(),
                    &b::return_to(&ret, Some(&b::string("small"))).unwrap(),
                )
                .unwrap(),
                b::default(Type::Void),
            ],
        ),
        &b::pre_increment_assign(&b::var(&visits)).unwrap(),
    )
    .unwrap();
    let body = b::block(
        &[visits.clone()],
        &[protected, b::label(&ret, Some(&b::string("big"))).unwrap()],
    );
    b::lambda(Some("early_return"), &[n], &body)
}

// ============================================================================
// Exceptions
// ============================================================================

pub fn finally_count() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let count = b::param("count", Type::I32);
    let result = b::param("result", Type::I32);
    let checked = b::condition(
        &b::greater_than(&b::var(&x), &b::int(0)).unwrap(),
        &b::var(&x),
        &b::throw_as(&b::string("negative"), Type::I32),
    )
    .unwrap();
    let protected = b::try_catch_finally(
        &checked,
        vec![b::catch(Type::Str, None, &b::int(-1))],
        &b::pre_increment_assign(&b::var(&count)).unwrap(),
    )
    .unwrap();
    let body = b::block(
        &[count.clone(), result.clone()],
        &[
            b::assign(&b::var(&result), &protected).unwrap(),
            b::new_array(Type::I32, &[b::var(&result), b::var(&count)]).unwrap(),
        ],
    );
    b::lambda(Some("finally_count"), &[x], &body)
}

/// `[iterations, finally runs]` for a loop whose body is a try/finally left
/// by `continue` on every pass but the last.
pub fn continue_through_finally() -> Rc<LambdaExpr> {
    let limit = b::param("limit", Type::I32);
    let i = b::param("i", Type::I32);
    let runs = b::param("runs", Type::I32);
    let brk = b::label_target("brk", Type::Void);
    let cont = b::label_target("cont", Type::Void);
    let pass = b::block(
        &[],
        &[
            b::pre_increment_assign(&b::var(&i)).unwrap(),
            b::if_then(
                &b::greater_than(&b::var(&i), &b::var(&limit)).unwrap(),
                &b::break_to(&brk, None).unwrap(),
            )
            .unwrap(),
            b::continue_to(&cont).unwrap(),
        ],
    );
    let protected = b::try_finally(&pass, &b::pre_increment_assign(&b::var(&runs)).unwrap())
        .unwrap();
    let body = b::block(
        &[i.clone(), runs.clone()],
        &[
            b::loop_expr(&protected, Some(&brk), Some(&cont)).unwrap(),
            b::new_array(Type::I32, &[b::var(&i), b::var(&runs)]).unwrap(),
        ],
    );
    b::lambda(Some("continue_through_finally"), &[limit], &body)
}

/// `[passes, finally runs]` for a backward `goto` to a label placed right
/// before a try/finally.
pub fn goto_before_try() -> Rc<LambdaExpr> {
    let n = b::param("n", Type::I32);
    let i = b::param("i", Type::I32);
    let runs = b::param("runs", Type::I32);
    let again = b::label_target("again", Type::Void);
    let pass = b::block(
        &[],
        &[
            b::pre_increment_assign(&b::var(&i)).unwrap(),
            b::if_then(
                &b::less_than(&b::var(&i), &b::var(&n)).unwrap(),
                &b::goto(&again).unwrap(),
            )
            .unwrap(),
        ],
    );
    let protected = b::try_finally(&pass, &b::pre_increment_assign(&b::var(&runs)).unwrap())
        .unwrap();
    let body = b::block(
        &[i.clone(), runs.clone()],
        &[
            b::label(&again, None).unwrap(),
            protected,
            b::new_array(Type::I32, &[b::var(&i), b::var(&runs)]).unwrap(),
        ],
    );
    b::lambda(Some("goto_before_try"), &[n], &body)
}

fn rethrow() -> Rc<LambdaExpr> {
    let flag = b::param("flag", Type::Bool);
    let e = b::param("e", Type::Str);
    let inner = b::try_catch(
        &b::condition(
            &b::var(&flag),
            &b::throw_as(&b::string("inner"), Type::Str),
            &b::string("quiet"),
        )
        .unwrap(),
        vec![b::catch(
            Type::Str,
            None,
            &b::block(&[], &[b::rethrow(), b::string("unused")]),
        )],
    )
    .unwrap();
    let outer = b::try_catch(
        &inner,
        vec![b::catch(
            Type::Str,
            Some(&e),
            &b::add(&b::string("caught "), &b::var(&e)).unwrap(),
        )],
    )
    .unwrap();
    b::lambda(Some("rethrow"), &[flag], &outer)
}

fn throw_from_nested() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let check = b::lambda(
        Some("check"),
        &[],
        &b::condition(
            &b::less_than(&b::var(&x), &b::int(0)).unwrap(),
            &b::throw_as(&b::string("negative"), Type::I32),
            &b::var(&x),
        )
        .unwrap(),
    );
    let call = b::invoke(&b::lambda_expr(&check), &[]).unwrap();
    let body = b::try_catch(&call, vec![b::catch(Type::Object, None, &b::int(0))]).unwrap();
    b::lambda(Some("throw_from_nested"), &[x], &body)
}

// ============================================================================
// Arrays
// ============================================================================

fn array_fill() -> Rc<LambdaExpr> {
    let n = b::param("n", Type::I32);
    let items = b::param("items", Type::array(Type::I32));
    let i = b::param("i", Type::I32);
    let done = b::label_target("done", Type::Void);
    let step = b::block(
        &[],
        &[
            b::if_then(
                &b::greater_than_or_equal(&b::var(&i), &b::array_length(&b::var(&items)).unwrap())
                    .unwrap(),
                &b::break_to(&done, None).unwrap(),
            )
            .unwrap(),
            b::assign(
                &b::index(&b::var(&items), &[b::var(&i)]).unwrap(),
                &b::multiply(&b::var(&i), &b::var(&i)).unwrap(),
            )
            .unwrap(),
            b::pre_increment_assign(&b::var(&i)).unwrap(),
        ],
    );
    let body = b::block(
        &[items.clone(), i.clone()],
        &[
            b::assign(
                &b::var(&items),
                &b::new_array_bounds(Type::I32, &b::var(&n)).unwrap(),
            )
            .unwrap(),
            b::loop_expr(&step, Some(&done), None).unwrap(),
            b::var(&items),
        ],
    );
    b::lambda(Some("array_fill"), &[n], &body)
}

fn element_access() -> Rc<LambdaExpr> {
    let i = b::param("i", Type::I32);
    let items = b::constant(
        Value::array(vec![Value::I32(10), Value::I32(20), Value::I32(30)]),
        Type::array(Type::I32),
    );
    let body = b::add(
        &b::index(&items, &[b::var(&i)]).unwrap(),
        &b::array_length(&items).unwrap(),
    )
    .unwrap();
    b::lambda(Some("element_access"), &[i], &body)
}

// ============================================================================
// Closures
// ============================================================================

pub fn counter() -> Rc<LambdaExpr> {
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
    b::lambda(Some("counter"), &[], &body)
}

fn adder() -> Rc<LambdaExpr> {
    let x = b::param("x", Type::I32);
    let y = b::param("y", Type::I32);
    let z = b::param("z", Type::I32);
    let add3 = b::lambda(
        Some("add3"),
        &[z.clone()],
        &b::add(&b::add(&b::var(&x), &b::var(&y)).unwrap(), &b::var(&z)).unwrap(),
    );
    let body = b::invoke(&b::lambda_expr(&add3), &[b::int(100)]).unwrap();
    b::lambda(Some("adder"), &[x, y], &body)
}

// ============================================================================
// Host types
// ============================================================================

fn point_copy() -> Rc<LambdaExpr> {
    let def = StructDef::value("Point")
        .field("x", Type::I32)
        .field("y", Type::I32)
        .build();
    let v = b::param("v", Type::I32);
    let p = b::param("p", def.ty());
    let q = b::param("q", def.ty());
    let body = b::block(
        &[p.clone(), q.clone()],
        &[
            b::assign(&b::var(&p), &b::new(&def, &[b::int(1), b::int(2)]).unwrap()).unwrap(),
            b::assign(&b::var(&q), &b::var(&p)).unwrap(),
            b::assign(&b::member(&b::var(&q), "x").unwrap(), &b::var(&v)).unwrap(),
            b::new_array(
                Type::I32,
                &[
                    b::member(&b::var(&p), "x").unwrap(),
                    b::member(&b::var(&q), "x").unwrap(),
                ],
            )
            .unwrap(),
        ],
    );
    b::lambda(Some("point_copy"), &[v], &body)
}

fn describe_animal(_: Option<&mut Value>, _: &[Value]) -> Result<Value, ExecutionError> {
    Ok(Value::str("animal"))
}

fn describe_dog(_: Option<&mut Value>, _: &[Value]) -> Result<Value, ExecutionError> {
    Ok(Value::str("dog"))
}

fn virtual_describe() -> Rc<LambdaExpr> {
    let animal = StructDef::class("Animal").field("legs", Type::I32).build();
    let dog = StructDef::class("Dog").base(animal.clone()).build();
    let describe = animal.add_method(
        MethodDef::new_instance("describe", Vec::new(), Type::Str, describe_animal).with_virtual(),
    );
    dog.add_method(
        MethodDef::new_instance("describe", Vec::new(), Type::Str, describe_dog).with_virtual(),
    );

    let flag = b::param("flag", Type::Bool);
    let a = b::param("a", animal.ty());
    let chosen = b::condition(
        &b::var(&flag),
        &b::convert(&b::new(&dog, &[b::int(4)]).unwrap(), animal.ty()).unwrap(),
        &b::new(&animal, &[b::int(2)]).unwrap(),
    )
    .unwrap();
    let body = b::block(
        &[a.clone()],
        &[
            b::assign(&b::var(&a), &chosen).unwrap(),
            b::add(
                &b::call_method(&b::var(&a), &describe, &[]).unwrap(),
                &b::string("!"),
            )
            .unwrap(),
        ],
    );
    b::lambda(Some("virtual_describe"), &[flag], &body)
}

fn get_fahrenheit(receiver: Option<&mut Value>, _: &[Value]) -> Result<Value, ExecutionError> {
    let this = receiver.ok_or_else(|| ExecutionError::internal("no receiver"))?;
    match this.field(0)? {
        Value::F64(c) => Ok(Value::F64(c * 9.0 / 5.0 + 32.0)),
        other => Err(ExecutionError::internal(format!("celsius was {:?}", other))),
    }
}

fn set_fahrenheit(receiver: Option<&mut Value>, args: &[Value]) -> Result<Value, ExecutionError> {
    let this = receiver.ok_or_else(|| ExecutionError::internal("no receiver"))?;
    match args {
        [Value::F64(f)] => {
            this.set_field(0, Value::F64((f - 32.0) * 5.0 / 9.0))?;
            Ok(Value::Unit)
        }
        other => Err(ExecutionError::internal(format!("bad arguments {:?}", other))),
    }
}

fn fahrenheit() -> Rc<LambdaExpr> {
    let def = StructDef::class("Temperature")
        .field("celsius", Type::F64)
        .build();
    def.add_property(
        "fahrenheit",
        Type::F64,
        MethodDef::new_instance("get_fahrenheit", Vec::new(), Type::F64, get_fahrenheit),
        Some(MethodDef::new_instance(
            "set_fahrenheit",
            vec![Type::F64],
            Type::Void,
            set_fahrenheit,
        )),
    );
    let f = b::param("f", Type::F64);
    let t = b::param("t", def.ty());
    let body = b::block(
        &[t.clone()],
        &[
            b::assign(&b::var(&t), &b::new(&def, &[b::float(0.0)]).unwrap()).unwrap(),
            b::assign(&b::member(&b::var(&t), "fahrenheit").unwrap(), &b::var(&f)).unwrap(),
            b::member(&b::var(&t), "celsius").unwrap(),
        ],
    );
    b::lambda(Some("fahrenheit"), &[f], &body)
}

fn row_get(receiver: Option<&mut Value>, args: &[Value]) -> Result<Value, ExecutionError> {
    let this = receiver.ok_or_else(|| ExecutionError::internal("no receiver"))?;
    let cells = this.field(0)?;
    cells.with_element(&args[0], |items, i| items[i].clone())
}

fn row_set(receiver: Option<&mut Value>, args: &[Value]) -> Result<Value, ExecutionError> {
    let this = receiver.ok_or_else(|| ExecutionError::internal("no receiver"))?;
    let cells = this.field(0)?;
    let value = args[1].clone();
    cells.with_element(&args[0], |items, i| items[i] = value)?;
    Ok(Value::Unit)
}

fn row_indexer() -> Rc<LambdaExpr> {
    let def = StructDef::class("Row")
        .field("cells", Type::array(Type::I32))
        .build();
    def.set_indexer(
        MethodDef::new_instance("get_item", vec![Type::I32], Type::I32, row_get),
        Some(MethodDef::new_instance(
            "set_item",
            vec![Type::I32, Type::I32],
            Type::Void,
            row_set,
        )),
    );
    let i = b::param("i", Type::I32);
    let r = b::param("r", def.ty());
    let cells = b::new_array(Type::I32, &[b::int(10), b::int(20), b::int(30)]).unwrap();
    let body = b::block(
        &[r.clone()],
        &[
            b::assign(&b::var(&r), &b::new(&def, &[cells]).unwrap()).unwrap(),
            b::assign(&b::index(&b::var(&r), &[b::var(&i)]).unwrap(), &b::int(7)).unwrap(),
            b::add(
                &b::index(&b::var(&r), &[b::int(0)]).unwrap(),
                &b::index(&b::var(&r), &[b::var(&i)]).unwrap(),
            )
            .unwrap(),
        ],
    );
    b::lambda(Some("row_indexer"), &[i], &body)
}

pub fn bump(receiver: Option<&mut Value>, _: &[Value]) -> Result<Value, ExecutionError> {
    let this = receiver.ok_or_else(|| ExecutionError::internal("no receiver"))?;
    let n = this.field(0)?.as_i32().unwrap_or_default();
    this.set_field(0, Value::I32(n + 1))?;
    Ok(Value::Unit)
}

/// A value struct mutated in place through a method.
pub fn tally() -> Rc<LambdaExpr> {
    let def = StructDef::value("Tally").field("n", Type::I32).build();
    let method = def.add_method(
        MethodDef::new_instance("bump", Vec::new(), Type::Void, bump).with_mutating_receiver(),
    );
    let start = b::param("start", Type::I32);
    let t = b::param("t", def.ty());
    let call = b::call_method(&b::var(&t), &method, &[]).unwrap();
    let body = b::block(
        &[t.clone()],
        &[
            b::assign(&b::var(&t), &b::new(&def, &[b::var(&start)]).unwrap()).unwrap(),
            call.clone(),
            call,
            b::member(&b::var(&t), "n").unwrap(),
        ],
    );
    b::lambda(Some("tally"), &[start], &body)
}
