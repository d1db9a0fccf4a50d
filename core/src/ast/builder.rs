//! Validating constructors for expression trees.
//!
//! Each constructor checks the operand shapes the node kind requires and
//! computes the node's static type. Constructors that cannot fail return the
//! node directly; the rest return `Result<_, BuildError>`.

use super::*;
use crate::types::{NumKind, StructDef};
use crate::{ToString, format};

fn node(ty: Type, kind: ExprKind) -> ExprRef {
    Rc::new(Expr { ty, kind })
}

fn expect_assignable(expected: &Type, found: &Type) -> Result<(), BuildError> {
    if expected.is_assignable_from(found) {
        Ok(())
    } else {
        Err(BuildError::TypeMismatch {
            expected: expected.clone(),
            found: found.clone(),
        })
    }
}

fn expect_args(what: &str, params: &[Type], args: &[ExprRef]) -> Result<(), BuildError> {
    if params.len() != args.len() {
        return Err(BuildError::ArgumentCount {
            what: what.to_string(),
            expected: params.len(),
            got: args.len(),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        expect_assignable(param, &arg.ty)?;
    }
    Ok(())
}

// --- Leaves ---

pub fn constant(value: Value, ty: Type) -> ExprRef {
    node(ty, ExprKind::Constant(value))
}

pub fn int(n: i32) -> ExprRef {
    constant(Value::I32(n), Type::I32)
}

pub fn long(n: i64) -> ExprRef {
    constant(Value::I64(n), Type::I64)
}

pub fn float(n: f64) -> ExprRef {
    constant(Value::F64(n), Type::F64)
}

pub fn boolean(b: bool) -> ExprRef {
    constant(Value::Bool(b), Type::Bool)
}

pub fn string(s: &str) -> ExprRef {
    constant(Value::str(s), Type::Str)
}

/// A null constant of a nullable or reference type.
pub fn null(ty: Type) -> Result<ExprRef, BuildError> {
    if !ty.admits_null() {
        return Err(BuildError::Invalid(format!("{} cannot be null", ty)));
    }
    Ok(constant(Value::Null, ty))
}

pub fn default(ty: Type) -> ExprRef {
    node(ty, ExprKind::Default)
}

pub fn param(name: &str, ty: Type) -> Rc<ParameterExpr> {
    Rc::new(ParameterExpr {
        name: name.to_string(),
        ty,
    })
}

/// A reference to a variable.
pub fn var(param: &Rc<ParameterExpr>) -> ExprRef {
    node(param.ty.clone(), ExprKind::Parameter(param.clone()))
}

pub fn label_target(name: &str, ty: Type) -> Rc<LabelTarget> {
    Rc::new(LabelTarget {
        name: Some(name.to_string()),
        ty,
    })
}

// --- Unary ---

pub fn unary(op: UnaryOp, operand: &ExprRef) -> Result<ExprRef, BuildError> {
    let ty = &operand.ty;
    let invalid = || BuildError::UnaryOperandType {
        op: format!("{:?}", op),
        operand: ty.clone(),
    };
    let result = match op {
        UnaryOp::Negate => match ty.lifted_num_kind() {
            Some(kind) if kind.is_signed() => ty.clone(),
            _ => return Err(invalid()),
        },
        UnaryOp::UnaryPlus | UnaryOp::Increment | UnaryOp::Decrement => {
            ty.lifted_num_kind().ok_or_else(invalid)?;
            ty.clone()
        }
        UnaryOp::Not => match ty.underlying() {
            Type::Bool => ty.clone(),
            Type::Num(kind) if kind.is_integer() => ty.clone(),
            _ => return Err(invalid()),
        },
        UnaryOp::ArrayLength => match ty {
            Type::Array(_) => Type::I32,
            _ => return Err(invalid()),
        },
        UnaryOp::Throw => Type::Void,
        UnaryOp::PreIncrementAssign
        | UnaryOp::PreDecrementAssign
        | UnaryOp::PostIncrementAssign
        | UnaryOp::PostDecrementAssign => {
            ty.num_kind().ok_or_else(invalid)?;
            expect_writable(operand)?;
            ty.clone()
        }
        UnaryOp::Convert => return Err(BuildError::Invalid("use convert()".to_string())),
    };
    Ok(node(
        result,
        ExprKind::Unary {
            op,
            operand: Some(operand.clone()),
            method: None,
        },
    ))
}

/// A unary operator implemented by a host method.
pub fn unary_method(
    op: UnaryOp,
    operand: &ExprRef,
    method: &Rc<MethodDef>,
) -> Result<ExprRef, BuildError> {
    expect_args(&method.name, &method.params, core::slice::from_ref(operand))?;
    Ok(node(
        method.ret.clone(),
        ExprKind::Unary {
            op,
            operand: Some(operand.clone()),
            method: Some(method.clone()),
        },
    ))
}

pub fn negate(operand: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::Negate, operand)
}

pub fn not(operand: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::Not, operand)
}

pub fn array_length(array: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::ArrayLength, array)
}

pub fn throw(exception: &ExprRef) -> ExprRef {
    throw_as(exception, Type::Void)
}

/// A throw in a position that expects a value of type `ty`.
pub fn throw_as(exception: &ExprRef, ty: Type) -> ExprRef {
    node(
        ty,
        ExprKind::Unary {
            op: UnaryOp::Throw,
            operand: Some(exception.clone()),
            method: None,
        },
    )
}

/// Rethrows the exception handled by the enclosing catch block.
pub fn rethrow() -> ExprRef {
    node(
        Type::Void,
        ExprKind::Unary {
            op: UnaryOp::Throw,
            operand: None,
            method: None,
        },
    )
}

fn is_reference_convertible(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Object, _) | (_, Type::Object) => true,
        (Type::Struct(a), Type::Struct(b)) => a.derives_from(b) || b.derives_from(a),
        _ => false,
    }
}

/// Type conversion. Numeric conversions wrap; unwrapping a null nullable
/// raises `InvalidOperation`; downcasts are checked.
pub fn convert(operand: &ExprRef, to: Type) -> Result<ExprRef, BuildError> {
    let from = &operand.ty;
    let ok = from == &to
        || (from.lifted_num_kind().is_some() && to.lifted_num_kind().is_some())
        || (to.is_nullable() && to.underlying() == from)
        || (from.is_nullable() && from.underlying() == &to)
        || is_reference_convertible(from, &to);
    if !ok {
        return Err(BuildError::NoConversion {
            from: from.clone(),
            to,
        });
    }
    Ok(node(
        to,
        ExprKind::Unary {
            op: UnaryOp::Convert,
            operand: Some(operand.clone()),
            method: None,
        },
    ))
}

pub fn increment(operand: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::Increment, operand)
}

pub fn decrement(operand: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::Decrement, operand)
}

pub fn pre_increment_assign(target: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::PreIncrementAssign, target)
}

pub fn post_increment_assign(target: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::PostIncrementAssign, target)
}

pub fn pre_decrement_assign(target: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::PreDecrementAssign, target)
}

pub fn post_decrement_assign(target: &ExprRef) -> Result<ExprRef, BuildError> {
    unary(UnaryOp::PostDecrementAssign, target)
}

// --- Binary ---

fn lifted(kind: NumKind, left: &Type, right: &Type) -> Type {
    if left.is_nullable() || right.is_nullable() {
        Type::nullable(Type::Num(kind))
    } else {
        Type::Num(kind)
    }
}

fn struct_operator_type(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    op.find_operator_method(left, right)
        .map(|method| method.ret.clone())
}

fn binary_result_type(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    if let Some(ty) = struct_operator_type(op, left, right) {
        return Some(ty);
    }
    let kinds = (left.lifted_num_kind(), right.lifted_num_kind());
    match op {
        BinaryOp::Add if left == &Type::Str && right == &Type::Str => Some(Type::Str),
        BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr
            if left == &Type::Bool && right == &Type::Bool =>
        {
            Some(Type::Bool)
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr => match kinds {
            (Some(l), Some(r)) if l.is_integer() && r.is_integer() => {
                Some(lifted(NumKind::promote(l, r), left, right))
            }
            _ => None,
        },
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => match kinds {
            (Some(l), Some(r)) => Some(lifted(NumKind::promote(l, r), left, right)),
            _ => None,
        },
        BinaryOp::LeftShift | BinaryOp::RightShift => match kinds {
            (Some(l), Some(NumKind::I32)) if l.is_integer() => {
                Some(lifted(NumKind::promote(l, l), left, right))
            }
            _ => None,
        },
        BinaryOp::AndAlso | BinaryOp::OrElse => {
            (left == &Type::Bool && right == &Type::Bool).then_some(Type::Bool)
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            let comparable = matches!(kinds, (Some(_), Some(_)))
                || left == right
                || left.is_assignable_from(right)
                || right.is_assignable_from(left);
            comparable.then_some(Type::Bool)
        }
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => match kinds {
            (Some(_), Some(_)) => Some(Type::Bool),
            _ => None,
        },
        BinaryOp::Coalesce => {
            if !left.admits_null() {
                return None;
            }
            let inner = left.underlying();
            if inner.is_assignable_from(right) || left.is_assignable_from(right) {
                Some(right.clone())
            } else {
                None
            }
        }
        BinaryOp::Assign
        | BinaryOp::AddAssign
        | BinaryOp::SubtractAssign
        | BinaryOp::MultiplyAssign
        | BinaryOp::DivideAssign
        | BinaryOp::ModuloAssign => None,
    }
}

fn expect_writable(target: &ExprRef) -> Result<(), BuildError> {
    match &target.kind {
        ExprKind::Parameter(_) => Ok(()),
        ExprKind::MemberAccess { member, .. } if member.is_writable() => Ok(()),
        ExprKind::Index { indexer: None, .. } => Ok(()),
        ExprKind::Index {
            indexer: Some(indexer),
            ..
        } if indexer.setter.is_some() => Ok(()),
        _ => Err(BuildError::NotAssignable),
    }
}

/// A binary node with type checking for primitive operands and host
/// operator lookup for struct operands.
pub fn binary(op: BinaryOp, left: &ExprRef, right: &ExprRef) -> Result<ExprRef, BuildError> {
    let ty = match op {
        BinaryOp::Assign => {
            expect_writable(left)?;
            expect_assignable(&left.ty, &right.ty)?;
            left.ty.clone()
        }
        op if op.compound_base().is_some() => {
            expect_writable(left)?;
            let base = op.compound_base().unwrap_or(op);
            let result = binary_result_type(base, &left.ty, &right.ty).ok_or_else(|| {
                BuildError::BinaryOperandTypes {
                    op: format!("{:?}", op),
                    left: left.ty.clone(),
                    right: right.ty.clone(),
                }
            })?;
            if result.lifted_num_kind().is_none() && result != left.ty {
                return Err(BuildError::TypeMismatch {
                    expected: left.ty.clone(),
                    found: result,
                });
            }
            left.ty.clone()
        }
        _ => binary_result_type(op, &left.ty, &right.ty).ok_or_else(|| {
            BuildError::BinaryOperandTypes {
                op: format!("{:?}", op),
                left: left.ty.clone(),
                right: right.ty.clone(),
            }
        })?,
    };
    Ok(binary_typed(op, left, right, ty, None))
}

/// A binary node with an explicit result type and optional operator method.
/// No operand checking is done.
pub fn binary_typed(
    op: BinaryOp,
    left: &ExprRef,
    right: &ExprRef,
    ty: Type,
    method: Option<&Rc<MethodDef>>,
) -> ExprRef {
    node(
        ty,
        ExprKind::Binary {
            op,
            left: left.clone(),
            right: right.clone(),
            method: method.cloned(),
        },
    )
}

/// A binary operator implemented by a host method.
pub fn binary_method(
    op: BinaryOp,
    left: &ExprRef,
    right: &ExprRef,
    method: &Rc<MethodDef>,
) -> Result<ExprRef, BuildError> {
    expect_args(&method.name, &method.params, &[left.clone(), right.clone()])?;
    Ok(binary_typed(op, left, right, method.ret.clone(), Some(method)))
}

macro_rules! binary_helpers {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(left: &ExprRef, right: &ExprRef) -> Result<ExprRef, BuildError> {
                binary(BinaryOp::$op, left, right)
            }
        )*
    };
}

binary_helpers! {
    add => Add,
    subtract => Subtract,
    multiply => Multiply,
    divide => Divide,
    modulo => Modulo,
    and => And,
    or => Or,
    exclusive_or => ExclusiveOr,
    left_shift => LeftShift,
    right_shift => RightShift,
    and_also => AndAlso,
    or_else => OrElse,
    equal => Equal,
    not_equal => NotEqual,
    less_than => LessThan,
    less_than_or_equal => LessThanOrEqual,
    greater_than => GreaterThan,
    greater_than_or_equal => GreaterThanOrEqual,
    coalesce => Coalesce,
    assign => Assign,
    add_assign => AddAssign,
    subtract_assign => SubtractAssign,
    multiply_assign => MultiplyAssign,
    divide_assign => DivideAssign,
    modulo_assign => ModuloAssign,
}

// --- Members and calls ---

pub fn call(
    object: Option<&ExprRef>,
    method: &Rc<MethodDef>,
    args: &[ExprRef],
) -> Result<ExprRef, BuildError> {
    if method.is_static == object.is_some() {
        return Err(BuildError::ReceiverMismatch {
            method: method.name.clone(),
            is_static: method.is_static,
        });
    }
    expect_args(&method.name, &method.params, args)?;
    Ok(node(
        method.ret.clone(),
        ExprKind::Call {
            object: object.cloned(),
            method: method.clone(),
            args: args.to_vec(),
        },
    ))
}

pub fn call_static(method: &Rc<MethodDef>, args: &[ExprRef]) -> Result<ExprRef, BuildError> {
    call(None, method, args)
}

pub fn call_method(
    object: &ExprRef,
    method: &Rc<MethodDef>,
    args: &[ExprRef],
) -> Result<ExprRef, BuildError> {
    call(Some(object), method, args)
}

fn new_expr(
    def: &Rc<StructDef>,
    constructor: Option<&Rc<MethodDef>>,
    args: &[ExprRef],
) -> Result<NewExpr, BuildError> {
    match constructor {
        Some(ctor) => {
            expect_args(&ctor.name, &ctor.params, args)?;
            expect_assignable(&def.ty(), &ctor.ret)?;
        }
        None => {
            let fields = def.all_fields();
            if args.len() > fields.len() {
                return Err(BuildError::ArgumentCount {
                    what: def.name.clone(),
                    expected: fields.len(),
                    got: args.len(),
                });
            }
            for (field, arg) in fields.iter().zip(args) {
                expect_assignable(&field.ty, &arg.ty)?;
            }
        }
    }
    Ok(NewExpr {
        def: def.clone(),
        constructor: constructor.cloned(),
        args: args.to_vec(),
    })
}

/// Instantiates `def`, initializing its leading fields positionally.
pub fn new(def: &Rc<StructDef>, args: &[ExprRef]) -> Result<ExprRef, BuildError> {
    Ok(node(def.ty(), ExprKind::New(new_expr(def, None, args)?)))
}

/// Instantiates `def` through a static factory method.
pub fn new_with(
    def: &Rc<StructDef>,
    constructor: &Rc<MethodDef>,
    args: &[ExprRef],
) -> Result<ExprRef, BuildError> {
    Ok(node(
        def.ty(),
        ExprKind::New(new_expr(def, Some(constructor), args)?),
    ))
}

fn resolve_member(ty: &Type, name: &str) -> Result<Member, BuildError> {
    ty.as_struct()
        .and_then(|def| def.member(name))
        .ok_or_else(|| BuildError::Invalid(format!("{} has no member '{}'", ty, name)))
}

/// Field or property access by name.
pub fn member(object: &ExprRef, name: &str) -> Result<ExprRef, BuildError> {
    let member = resolve_member(&object.ty, name)?;
    Ok(node(
        member.ty().clone(),
        ExprKind::MemberAccess {
            object: object.clone(),
            member,
        },
    ))
}

/// Array element or indexer access.
pub fn index(object: &ExprRef, args: &[ExprRef]) -> Result<ExprRef, BuildError> {
    let (ty, indexer) = match &object.ty {
        Type::Array(element) => {
            let [index] = args else {
                return Err(BuildError::ArgumentCount {
                    what: "array index".to_string(),
                    expected: 1,
                    got: args.len(),
                });
            };
            if !index.ty.num_kind().is_some_and(NumKind::is_integer) {
                return Err(BuildError::TypeMismatch {
                    expected: Type::I32,
                    found: index.ty.clone(),
                });
            }
            ((**element).clone(), None)
        }
        Type::Struct(def) => {
            let indexer = def.indexer().ok_or_else(|| BuildError::NoIndexer {
                ty: object.ty.clone(),
            })?;
            expect_args("indexer", &indexer.getter.params, args)?;
            (indexer.getter.ret.clone(), Some(indexer))
        }
        other => {
            return Err(BuildError::NoIndexer { ty: other.clone() });
        }
    };
    Ok(node(
        ty,
        ExprKind::Index {
            object: object.clone(),
            indexer,
            args: args.to_vec(),
        },
    ))
}

pub fn new_array(element: Type, items: &[ExprRef]) -> Result<ExprRef, BuildError> {
    for item in items {
        expect_assignable(&element, &item.ty)?;
    }
    Ok(node(
        Type::array(element.clone()),
        ExprKind::NewArray {
            element,
            init: ArrayInit::Elements(items.to_vec()),
        },
    ))
}

/// An array of `length` default elements.
pub fn new_array_bounds(element: Type, length: &ExprRef) -> Result<ExprRef, BuildError> {
    if !length.ty.num_kind().is_some_and(NumKind::is_integer) {
        return Err(BuildError::TypeMismatch {
            expected: Type::I32,
            found: length.ty.clone(),
        });
    }
    Ok(node(
        Type::array(element.clone()),
        ExprKind::NewArray {
            element,
            init: ArrayInit::Bounds(length.clone()),
        },
    ))
}

/// `new T(args) { a = x, b = y }`.
pub fn member_init(
    def: &Rc<StructDef>,
    args: &[ExprRef],
    bindings: &[(&str, ExprRef)],
) -> Result<ExprRef, BuildError> {
    let new = new_expr(def, None, args)?;
    let ty = def.ty();
    let mut resolved = Vec::with_capacity(bindings.len());
    for (name, value) in bindings {
        let member = resolve_member(&ty, name)?;
        if !member.is_writable() {
            return Err(BuildError::NotAssignable);
        }
        expect_assignable(member.ty(), &value.ty)?;
        resolved.push(MemberBinding::Assign(member, value.clone()));
    }
    Ok(node(
        ty,
        ExprKind::MemberInit {
            new,
            bindings: resolved,
        },
    ))
}

pub fn invoke(target: &ExprRef, args: &[ExprRef]) -> Result<ExprRef, BuildError> {
    let Type::Function(sig) = &target.ty else {
        return Err(BuildError::TypeMismatch {
            expected: Type::function(Vec::new(), Type::Object),
            found: target.ty.clone(),
        });
    };
    expect_args("invoke", &sig.params, args)?;
    Ok(node(
        sig.ret.clone(),
        ExprKind::Invoke {
            target: target.clone(),
            args: args.to_vec(),
        },
    ))
}

// --- Control flow ---

/// `test ? if_true : if_false`; both branches must have the same type.
pub fn condition(
    test: &ExprRef,
    if_true: &ExprRef,
    if_false: &ExprRef,
) -> Result<ExprRef, BuildError> {
    expect_assignable(&if_true.ty, &if_false.ty)?;
    condition_typed(test, if_true, if_false, if_true.ty.clone())
}

pub fn condition_typed(
    test: &ExprRef,
    if_true: &ExprRef,
    if_false: &ExprRef,
    ty: Type,
) -> Result<ExprRef, BuildError> {
    expect_assignable(&Type::Bool, &test.ty)?;
    if !ty.is_void() {
        expect_assignable(&ty, &if_true.ty)?;
        expect_assignable(&ty, &if_false.ty)?;
    }
    Ok(node(
        ty,
        ExprKind::Conditional {
            test: test.clone(),
            if_true: if_true.clone(),
            if_false: if_false.clone(),
        },
    ))
}

/// `if (test) { body }` with no value.
pub fn if_then(test: &ExprRef, body: &ExprRef) -> Result<ExprRef, BuildError> {
    condition_typed(test, body, &default(Type::Void), Type::Void)
}

/// A block whose value is its last expression.
pub fn block(variables: &[Rc<ParameterExpr>], exprs: &[ExprRef]) -> ExprRef {
    let ty = exprs.last().map_or(Type::Void, |last| last.ty.clone());
    node(
        ty,
        ExprKind::Block {
            variables: variables.to_vec(),
            exprs: exprs.to_vec(),
        },
    )
}

pub fn block_typed(
    ty: Type,
    variables: &[Rc<ParameterExpr>],
    exprs: &[ExprRef],
) -> Result<ExprRef, BuildError> {
    if !ty.is_void() {
        let last = exprs.last().ok_or_else(|| {
            BuildError::Invalid("a valued block needs at least one expression".to_string())
        })?;
        expect_assignable(&ty, &last.ty)?;
    }
    Ok(node(
        ty,
        ExprKind::Block {
            variables: variables.to_vec(),
            exprs: exprs.to_vec(),
        },
    ))
}

/// An infinite loop, left through `break_label` (whose type is the loop's).
pub fn loop_expr(
    body: &ExprRef,
    break_label: Option<&Rc<LabelTarget>>,
    continue_label: Option<&Rc<LabelTarget>>,
) -> Result<ExprRef, BuildError> {
    if let Some(cont) = continue_label {
        if !cont.ty.is_void() {
            return Err(BuildError::Invalid(
                "continue labels carry no value".to_string(),
            ));
        }
    }
    let ty = break_label.map_or(Type::Void, |label| label.ty.clone());
    Ok(node(
        ty,
        ExprKind::Loop {
            body: body.clone(),
            break_label: break_label.cloned(),
            continue_label: continue_label.cloned(),
        },
    ))
}

/// Marks the position of `target`. A valued label needs a default for when
/// control falls into it.
pub fn label(target: &Rc<LabelTarget>, default: Option<&ExprRef>) -> Result<ExprRef, BuildError> {
    match default {
        Some(value) => expect_assignable(&target.ty, &value.ty)?,
        None if !target.ty.is_void() => {
            return Err(BuildError::LabelNeedsValue {
                label: target.display_name().to_string(),
                ty: target.ty.clone(),
            });
        }
        None => {}
    }
    Ok(node(
        target.ty.clone(),
        ExprKind::Label {
            target: target.clone(),
            default: default.cloned(),
        },
    ))
}

/// A jump. `ty` is the type of the position the jump occupies.
pub fn make_goto(
    kind: GotoKind,
    target: &Rc<LabelTarget>,
    value: Option<&ExprRef>,
    ty: Type,
) -> Result<ExprRef, BuildError> {
    match value {
        Some(value) => expect_assignable(&target.ty, &value.ty)?,
        None if !target.ty.is_void() => {
            return Err(BuildError::LabelNeedsValue {
                label: target.display_name().to_string(),
                ty: target.ty.clone(),
            });
        }
        None => {}
    }
    Ok(node(
        ty,
        ExprKind::Goto {
            kind,
            target: target.clone(),
            value: value.cloned(),
        },
    ))
}

pub fn goto(target: &Rc<LabelTarget>) -> Result<ExprRef, BuildError> {
    make_goto(GotoKind::Goto, target, None, Type::Void)
}

pub fn return_to(target: &Rc<LabelTarget>, value: Option<&ExprRef>) -> Result<ExprRef, BuildError> {
    make_goto(GotoKind::Return, target, value, Type::Void)
}

pub fn break_to(target: &Rc<LabelTarget>, value: Option<&ExprRef>) -> Result<ExprRef, BuildError> {
    make_goto(GotoKind::Break, target, value, Type::Void)
}

pub fn continue_to(target: &Rc<LabelTarget>) -> Result<ExprRef, BuildError> {
    make_goto(GotoKind::Continue, target, None, Type::Void)
}

pub fn catch(test: Type, variable: Option<&Rc<ParameterExpr>>, body: &ExprRef) -> CatchBlock {
    CatchBlock {
        test,
        variable: variable.cloned(),
        filter: None,
        body: body.clone(),
    }
}

pub fn catch_when(
    test: Type,
    variable: Option<&Rc<ParameterExpr>>,
    filter: &ExprRef,
    body: &ExprRef,
) -> Result<CatchBlock, BuildError> {
    expect_assignable(&Type::Bool, &filter.ty)?;
    Ok(CatchBlock {
        filter: Some(filter.clone()),
        ..catch(test, variable, body)
    })
}

/// A protected region. Handler bodies must produce the body's type.
pub fn try_expr(
    body: &ExprRef,
    handlers: Vec<CatchBlock>,
    finally: Option<&ExprRef>,
    fault: Option<&ExprRef>,
) -> Result<ExprRef, BuildError> {
    if handlers.is_empty() && finally.is_none() && fault.is_none() {
        return Err(BuildError::Invalid(
            "try needs a catch, finally or fault block".to_string(),
        ));
    }
    if fault.is_some() && (finally.is_some() || !handlers.is_empty()) {
        return Err(BuildError::Invalid(
            "a fault block cannot be combined with catch or finally".to_string(),
        ));
    }
    let ty = body.ty.clone();
    if !ty.is_void() {
        for handler in &handlers {
            expect_assignable(&ty, &handler.body.ty)?;
        }
    }
    Ok(node(
        ty,
        ExprKind::Try(TryExpr {
            body: body.clone(),
            handlers,
            finally: finally.cloned(),
            fault: fault.cloned(),
        }),
    ))
}

pub fn try_catch(body: &ExprRef, handlers: Vec<CatchBlock>) -> Result<ExprRef, BuildError> {
    try_expr(body, handlers, None, None)
}

pub fn try_finally(body: &ExprRef, finally: &ExprRef) -> Result<ExprRef, BuildError> {
    try_expr(body, Vec::new(), Some(finally), None)
}

pub fn try_catch_finally(
    body: &ExprRef,
    handlers: Vec<CatchBlock>,
    finally: &ExprRef,
) -> Result<ExprRef, BuildError> {
    try_expr(body, handlers, Some(finally), None)
}

pub fn try_fault(body: &ExprRef, fault: &ExprRef) -> Result<ExprRef, BuildError> {
    try_expr(body, Vec::new(), None, Some(fault))
}

pub fn switch_case(tests: &[ExprRef], body: &ExprRef) -> SwitchCase {
    SwitchCase {
        tests: tests.to_vec(),
        body: body.clone(),
    }
}

/// A switch over `value`. Cases are tested in order with `==` (or with
/// `comparison`); the first match wins.
pub fn switch(
    ty: Type,
    value: &ExprRef,
    cases: Vec<SwitchCase>,
    default: Option<&ExprRef>,
    comparison: Option<&Rc<MethodDef>>,
) -> Result<ExprRef, BuildError> {
    for case in &cases {
        for test in &case.tests {
            match comparison {
                Some(method) => {
                    expect_args(&method.name, &method.params, &[value.clone(), test.clone()])?;
                }
                None => {
                    binary_result_type(BinaryOp::Equal, &value.ty, &test.ty).ok_or_else(
                        || BuildError::TypeMismatch {
                            expected: value.ty.clone(),
                            found: test.ty.clone(),
                        },
                    )?;
                }
            }
        }
        if !ty.is_void() {
            expect_assignable(&ty, &case.body.ty)?;
        }
    }
    if let (false, Some(default)) = (ty.is_void(), default) {
        expect_assignable(&ty, &default.ty)?;
    }
    Ok(node(
        ty,
        ExprKind::Switch(SwitchExpr {
            value: value.clone(),
            cases,
            default: default.cloned(),
            comparison: comparison.cloned(),
        }),
    ))
}

// --- Lambdas ---

/// A lambda returning its body's value.
pub fn lambda(
    name: Option<&str>,
    params: &[Rc<ParameterExpr>],
    body: &ExprRef,
) -> Rc<LambdaExpr> {
    build_lambda(name, params, body, body.ty.clone())
}

/// A lambda with an explicit return type; a `Void` return discards the
/// body's value.
pub fn lambda_typed(
    name: Option<&str>,
    params: &[Rc<ParameterExpr>],
    body: &ExprRef,
    ret: Type,
) -> Result<Rc<LambdaExpr>, BuildError> {
    if !ret.is_void() {
        expect_assignable(&ret, &body.ty)?;
    }
    Ok(build_lambda(name, params, body, ret))
}

fn build_lambda(
    name: Option<&str>,
    params: &[Rc<ParameterExpr>],
    body: &ExprRef,
    ret: Type,
) -> Rc<LambdaExpr> {
    let signature = Signature::new(params.iter().map(|p| p.ty.clone()).collect(), ret);
    Rc::new(LambdaExpr {
        name: name.map(|n| n.to_string()),
        params: params.to_vec(),
        body: body.clone(),
        signature: Rc::new(signature),
    })
}

/// Uses a lambda as a value inside another tree.
pub fn lambda_expr(lambda: &Rc<LambdaExpr>) -> ExprRef {
    node(
        Type::Function(lambda.signature.clone()),
        ExprKind::Lambda(lambda.clone()),
    )
}
