//! Compiled and evaluated forms of the same tree must be indistinguishable.

mod cases;
mod common;

use cases::CASES;
use common::{assert_paths_agree, compiled, ints};
use pretty_assertions::assert_eq;
use vellum::{FastPath, Value, compiler};

#[test]
fn every_case_agrees() {
    for case in CASES.iter() {
        let lambda = (case.program)();
        assert!(
            matches!(compiler::try_compile(&lambda), Ok(FastPath::Compiled(_))),
            "{} should take the fast path",
            case.name
        );
        assert_paths_agree(&lambda, &(case.inputs)());
    }
}

#[test]
fn add_outcomes() {
    let outcomes = assert_paths_agree(
        &cases::add_i32(),
        &[ints(&[2, 3]), ints(&[-1, 1]), ints(&[i32::MAX, 1])],
    );
    assert_eq!(outcomes, ["I32(5)", "I32(0)", "I32(-2147483648)"]);
}

#[test]
fn pick_outcomes() {
    let outcomes = assert_paths_agree(
        &cases::pick(),
        &[vec![Value::Bool(true)], vec![Value::Bool(false)]],
    );
    assert_eq!(outcomes, ["Str(\"yes\")", "Str(\"no\")"]);
}

#[test]
fn finally_outcomes() {
    let outcomes = assert_paths_agree(&cases::finally_count(), &[ints(&[4]), ints(&[-4])]);
    // The finally block runs exactly once on both exits.
    assert_eq!(outcomes, ["[I32(4), I32(1)]", "[I32(-1), I32(1)]"]);
}

#[test]
fn counter_outcomes() {
    let outcomes = assert_paths_agree(&cases::counter(), &[vec![]]);
    assert_eq!(outcomes, ["[I32(1), I32(2), I32(2)]"]);
}

#[test]
fn sum_outcomes() {
    let outcomes = assert_paths_agree(&cases::sum_to(), &[ints(&[0]), ints(&[4]), ints(&[100])]);
    assert_eq!(outcomes, ["I32(0)", "I32(10)", "I32(5050)"]);
}

#[test]
fn tally_outcomes() {
    let outcomes = assert_paths_agree(&cases::tally(), &[ints(&[0]), ints(&[40])]);
    assert_eq!(outcomes, ["I32(2)", "I32(42)"]);
}

#[test]
fn compiled_function_is_reusable() {
    let f = compiled(&cases::add_i32());
    for n in 0..100 {
        assert_eq!(f.call(&ints(&[n, n])).unwrap(), Value::I32(2 * n));
    }
}
