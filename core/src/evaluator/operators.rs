//! Primitive operator implementations.
//!
//! Both execution paths call into this module, so the compiled and the
//! interpreted forms of an expression agree on every numeric edge case.
//! Operands arrive already converted to the operation's kind (shift counts
//! are always `i32`).

use crate::ast::BinaryOp;
use crate::evaluator::ExecutionError;
use crate::types::{NumKind, Type};
use crate::values::{Exception, ExceptionKind, Value};
use crate::{String, format};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

fn mismatch(what: &str, left: &Value, right: &Value) -> ExecutionError {
    ExecutionError::internal(format!("{} on {:?} and {:?}", what, left, right))
}

macro_rules! int_arith {
    ($op:expr, $a:expr, $b:expr, $variant:ident) => {{
        let (a, b) = ($a, $b);
        Value::$variant(match $op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div => {
                if b == 0 {
                    return Err(Exception::divide_by_zero().into());
                }
                // wrapping_div covers MIN / -1
                a.wrapping_div(b)
            }
            ArithOp::Rem => {
                if b == 0 {
                    return Err(Exception::divide_by_zero().into());
                }
                a.wrapping_rem(b)
            }
            ArithOp::BitAnd => a & b,
            ArithOp::BitOr => a | b,
            ArithOp::BitXor => a ^ b,
            ArithOp::Shl => a.wrapping_shl(b as u32),
            ArithOp::Shr => a.wrapping_shr(b as u32),
        })
    }};
}

macro_rules! float_arith {
    ($op:expr, $a:expr, $b:expr, $variant:ident, $left:expr, $right:expr) => {{
        let (a, b) = ($a, $b);
        Value::$variant(match $op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
            _ => return Err(mismatch("bitwise operation", $left, $right)),
        })
    }};
}

macro_rules! int_shift {
    ($op:expr, $a:expr, $count:expr, $variant:ident) => {{
        let count = $count as u32;
        Value::$variant(match $op {
            ArithOp::Shl => $a.wrapping_shl(count),
            _ => $a.wrapping_shr(count),
        })
    }};
}

/// Binary arithmetic and bitwise operators.
///
/// Integer arithmetic wraps on overflow; integer division and remainder by
/// zero raise `DivideByZero`. Floats follow IEEE 754.
pub fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value, ExecutionError> {
    if matches!(op, ArithOp::Shl | ArithOp::Shr) {
        let Value::I32(count) = *right else {
            return Err(mismatch("shift", left, right));
        };
        return Ok(match *left {
            Value::I8(a) => int_shift!(op, a, count, I8),
            Value::I16(a) => int_shift!(op, a, count, I16),
            Value::I32(a) => int_shift!(op, a, count, I32),
            Value::I64(a) => int_shift!(op, a, count, I64),
            Value::U8(a) => int_shift!(op, a, count, U8),
            Value::U16(a) => int_shift!(op, a, count, U16),
            Value::U32(a) => int_shift!(op, a, count, U32),
            Value::U64(a) => int_shift!(op, a, count, U64),
            _ => return Err(mismatch("shift", left, right)),
        });
    }
    Ok(match (left, right) {
        (Value::I8(a), Value::I8(b)) => int_arith!(op, *a, *b, I8),
        (Value::I16(a), Value::I16(b)) => int_arith!(op, *a, *b, I16),
        (Value::I32(a), Value::I32(b)) => int_arith!(op, *a, *b, I32),
        (Value::I64(a), Value::I64(b)) => int_arith!(op, *a, *b, I64),
        (Value::U8(a), Value::U8(b)) => int_arith!(op, *a, *b, U8),
        (Value::U16(a), Value::U16(b)) => int_arith!(op, *a, *b, U16),
        (Value::U32(a), Value::U32(b)) => int_arith!(op, *a, *b, U32),
        (Value::U64(a), Value::U64(b)) => int_arith!(op, *a, *b, U64),
        (Value::F32(a), Value::F32(b)) => float_arith!(op, *a, *b, F32, left, right),
        (Value::F64(a), Value::F64(b)) => float_arith!(op, *a, *b, F64, left, right),
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(match op {
            ArithOp::BitAnd => a & b,
            ArithOp::BitOr => a | b,
            ArithOp::BitXor => a ^ b,
            _ => return Err(mismatch("arithmetic", left, right)),
        }),
        _ => return Err(mismatch("arithmetic", left, right)),
    })
}

/// The arithmetic operator a binary node applies to numeric operands.
pub fn arith_op(op: BinaryOp) -> Option<ArithOp> {
    Some(match op {
        BinaryOp::Add | BinaryOp::AddAssign => ArithOp::Add,
        BinaryOp::Subtract | BinaryOp::SubtractAssign => ArithOp::Sub,
        BinaryOp::Multiply | BinaryOp::MultiplyAssign => ArithOp::Mul,
        BinaryOp::Divide | BinaryOp::DivideAssign => ArithOp::Div,
        BinaryOp::Modulo | BinaryOp::ModuloAssign => ArithOp::Rem,
        BinaryOp::And => ArithOp::BitAnd,
        BinaryOp::Or => ArithOp::BitOr,
        BinaryOp::ExclusiveOr => ArithOp::BitXor,
        BinaryOp::LeftShift => ArithOp::Shl,
        BinaryOp::RightShift => ArithOp::Shr,
        _ => return None,
    })
}

pub fn cmp_op(op: BinaryOp) -> Option<CmpOp> {
    Some(match op {
        BinaryOp::LessThan => CmpOp::Lt,
        BinaryOp::LessThanOrEqual => CmpOp::Le,
        BinaryOp::GreaterThan => CmpOp::Gt,
        BinaryOp::GreaterThanOrEqual => CmpOp::Ge,
        _ => return None,
    })
}

/// Numeric kind a binary operator runs in, from its operand types.
///
/// Both execution paths convert operands to this kind before applying the
/// operator. Shift counts keep their own `i32` kind. `None` when the
/// operands are not both numeric.
pub fn operation_kind(op: BinaryOp, left: &Type, right: &Type) -> Option<NumKind> {
    let l = left.lifted_num_kind()?;
    if matches!(op, BinaryOp::LeftShift | BinaryOp::RightShift) {
        return Some(NumKind::promote(l, l));
    }
    let r = right.lifted_num_kind()?;
    Some(NumKind::promote(l, r))
}

/// Whether a binary operator takes the lifted (null-propagating) form.
pub fn is_lifted(left: &Type, right: &Type) -> bool {
    left.is_nullable() || right.is_nullable()
}

/// The constant one of a numeric kind, for increments.
pub fn one(kind: NumKind) -> Value {
    Value::num_from_i64(kind, 1)
}

/// Ordering comparison. Any comparison involving NaN is false.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExecutionError> {
    use core::cmp::Ordering;

    let ordering: Option<Ordering> = match (left, right) {
        (Value::I8(a), Value::I8(b)) => a.partial_cmp(b),
        (Value::I16(a), Value::I16(b)) => a.partial_cmp(b),
        (Value::I32(a), Value::I32(b)) => a.partial_cmp(b),
        (Value::I64(a), Value::I64(b)) => a.partial_cmp(b),
        (Value::U8(a), Value::U8(b)) => a.partial_cmp(b),
        (Value::U16(a), Value::U16(b)) => a.partial_cmp(b),
        (Value::U32(a), Value::U32(b)) => a.partial_cmp(b),
        (Value::U64(a), Value::U64(b)) => a.partial_cmp(b),
        (Value::F32(a), Value::F32(b)) => a.partial_cmp(b),
        (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
        _ => return Err(mismatch("comparison", left, right)),
    };
    Ok(match ordering {
        None => false,
        Some(ordering) => match op {
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        },
    })
}

pub fn negate(value: &Value) -> Result<Value, ExecutionError> {
    Ok(match *value {
        Value::I8(n) => Value::I8(n.wrapping_neg()),
        Value::I16(n) => Value::I16(n.wrapping_neg()),
        Value::I32(n) => Value::I32(n.wrapping_neg()),
        Value::I64(n) => Value::I64(n.wrapping_neg()),
        Value::F32(n) => Value::F32(-n),
        Value::F64(n) => Value::F64(-n),
        _ => return Err(ExecutionError::internal(format!("negate {:?}", value))),
    })
}

/// Logical not for booleans, bitwise complement for integers.
pub fn not(value: &Value) -> Result<Value, ExecutionError> {
    Ok(match *value {
        Value::Bool(b) => Value::Bool(!b),
        Value::I8(n) => Value::I8(!n),
        Value::I16(n) => Value::I16(!n),
        Value::I32(n) => Value::I32(!n),
        Value::I64(n) => Value::I64(!n),
        Value::U8(n) => Value::U8(!n),
        Value::U16(n) => Value::U16(!n),
        Value::U32(n) => Value::U32(!n),
        Value::U64(n) => Value::U64(!n),
        _ => return Err(ExecutionError::internal(format!("not {:?}", value))),
    })
}

macro_rules! cast_num {
    ($n:expr, $to:expr) => {
        match $to {
            NumKind::I8 => Value::I8($n as i8),
            NumKind::I16 => Value::I16($n as i16),
            NumKind::I32 => Value::I32($n as i32),
            NumKind::I64 => Value::I64($n as i64),
            NumKind::U8 => Value::U8($n as u8),
            NumKind::U16 => Value::U16($n as u16),
            NumKind::U32 => Value::U32($n as u32),
            NumKind::U64 => Value::U64($n as u64),
            NumKind::F32 => Value::F32($n as f32),
            NumKind::F64 => Value::F64($n as f64),
        }
    };
}

/// Unchecked numeric conversion with `as` semantics (integers truncate,
/// floats saturate).
pub fn convert(value: &Value, to: NumKind) -> Result<Value, ExecutionError> {
    Ok(match *value {
        Value::I8(n) => cast_num!(n, to),
        Value::I16(n) => cast_num!(n, to),
        Value::I32(n) => cast_num!(n, to),
        Value::I64(n) => cast_num!(n, to),
        Value::U8(n) => cast_num!(n, to),
        Value::U16(n) => cast_num!(n, to),
        Value::U32(n) => cast_num!(n, to),
        Value::U64(n) => cast_num!(n, to),
        Value::F32(n) => cast_num!(n, to),
        Value::F64(n) => cast_num!(n, to),
        _ => {
            return Err(ExecutionError::internal(format!(
                "convert {:?} to {}",
                value, to
            )));
        }
    })
}

/// Converts `value` to `kind`, passing null through.
pub fn to_kind(value: Value, kind: NumKind) -> Result<Value, ExecutionError> {
    if value.is_null() || value.num_kind() == Some(kind) {
        Ok(value)
    } else {
        convert(&value, kind)
    }
}

/// Converts a value of static type `from` to type `to` the way a conversion
/// node does: numeric conversion, unwrapping of nullable values (raising
/// when there is none) and checked casts between reference types.
pub fn convert_to(value: Value, from: &Type, to: &Type) -> Result<Value, ExecutionError> {
    if from == to {
        return Ok(value);
    }
    if let (Some(_), Some(target)) = (from.lifted_num_kind(), to.lifted_num_kind()) {
        if value.is_null() {
            return match to.is_nullable() {
                true => Ok(Value::Null),
                false => Err(Exception::no_value().into()),
            };
        }
        return to_kind(value, target);
    }
    if to.is_nullable() && to.underlying() == from {
        return Ok(value);
    }
    if from.is_nullable() && from.underlying() == to {
        return match value.is_null() {
            true => Err(Exception::no_value().into()),
            false => Ok(value),
        };
    }
    if !to.is_assignable_from(from) && !value.is_null() && !value.is_instance_of(to) {
        return Err(Exception::new(
            ExceptionKind::InvalidCast,
            format!("Unable to cast {:?} to {}.", value, to),
        )
        .into());
    }
    Ok(value)
}

/// String concatenation; null operands concatenate as empty strings.
pub fn concat(left: &Value, right: &Value) -> Result<Value, ExecutionError> {
    let mut out = String::new();
    for operand in [left, right] {
        match operand {
            Value::Str(s) => out.push_str(s),
            Value::Null => {}
            other => return Err(mismatch("concat", other, other)),
        }
    }
    Ok(Value::str(&out))
}
