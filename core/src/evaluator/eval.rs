//! Core evaluation logic.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::{
    ToString, Vec,
    ast::{
        ArrayInit, BinaryOp, Expr, ExprKind, ExprRef, LabelKey, LabelTarget, LambdaExpr,
        MemberBinding, NewExpr, ParamKey, ParameterExpr, SwitchExpr, TryExpr, UnaryOp,
    },
    evaluator::{ExecutionError, ExecutionOptions, ResourceExceededError, operators},
    format,
    scope_stack::ScopeStack,
    types::{Indexer, Member, MethodDef, NumKind, Signature, Type},
    values::{Exception, ExceptionKind, Function, SharedCell, Value},
};

/// Ways control can leave an expression other than producing its value.
enum Flow {
    Error(ExecutionError),
    /// A jump travelling outwards until the block, loop or lambda body that
    /// holds its label takes it.
    Jump {
        target: Rc<LabelTarget>,
        value: Value,
    },
}

impl From<ExecutionError> for Flow {
    fn from(error: ExecutionError) -> Self {
        Flow::Error(error)
    }
}

impl From<Exception> for Flow {
    fn from(exception: Exception) -> Self {
        Flow::Error(exception.into())
    }
}

type EvalResult<T = Value> = Result<T, Flow>;

fn new_cell(value: Value) -> SharedCell {
    Rc::new(RefCell::new(value))
}

fn is_label_of(expr: &Expr, target: &Rc<LabelTarget>) -> bool {
    matches!(&expr.kind, ExprKind::Label { target: t, .. } if Rc::ptr_eq(t, target))
}

fn lifted_miss(op: BinaryOp) -> Value {
    if op.is_comparison() {
        Value::Bool(false)
    } else {
        Value::Null
    }
}

/// A lambda evaluated by walking its body on every call.
pub struct InterpretedLambda {
    lambda: Rc<LambdaExpr>,
    /// Variables visible where the lambda was created.
    captured: Rc<[(ParamKey, SharedCell)]>,
    options: ExecutionOptions,
    /// Evaluation depth shared by every lambda created from this one.
    depth: Rc<Cell<usize>>,
}

impl InterpretedLambda {
    pub fn new(lambda: Rc<LambdaExpr>, options: ExecutionOptions) -> Self {
        Self {
            lambda,
            captured: Rc::from(Vec::new()),
            options,
            depth: Rc::new(Cell::new(0)),
        }
    }

    pub fn lambda(&self) -> &Rc<LambdaExpr> {
        &self.lambda
    }
}

impl Function for InterpretedLambda {
    fn signature(&self) -> &Signature {
        &self.lambda.signature
    }

    fn call(&self, args: &[Value]) -> Result<Value, ExecutionError> {
        ExecutionError::check_arity(self.lambda.params.len(), args.len())?;
        let mut scopes = ScopeStack::from_bindings(self.captured.to_vec());
        scopes.push_scope();
        for (param, arg) in self.lambda.params.iter().zip(args) {
            scopes.bind(ParamKey::of(param), new_cell(arg.clone()));
        }
        let mut evaluator = Evaluator {
            options: self.options,
            scopes,
            caught: Vec::new(),
            depth: self.depth.clone(),
        };
        evaluator.eval_body(&self.lambda)
    }
}

impl fmt::Debug for InterpretedLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpretedLambda")
            .field("name", &self.lambda.name)
            .field("captured", &self.captured.len())
            .finish()
    }
}

/// Where a receiver lives: in a variable (updated in place) or in a
/// temporary copy.
enum Receiver {
    Var(SharedCell),
    Value(Value),
}

/// An assignable location.
enum Place {
    Var(SharedCell),
    Member {
        receiver: Receiver,
        member: Member,
    },
    Element {
        array: Value,
        index: Value,
    },
    Indexer {
        receiver: Receiver,
        indexer: Rc<Indexer>,
        args: Vec<Value>,
    },
}

/// Evaluator state for one invocation of an interpreted lambda.
struct Evaluator {
    options: ExecutionOptions,
    scopes: ScopeStack<ParamKey, SharedCell>,
    /// Exceptions of the catch blocks being evaluated, innermost last.
    caught: Vec<Value>,
    depth: Rc<Cell<usize>>,
}

impl Evaluator {
    fn eval_body(&mut self, lambda: &LambdaExpr) -> Result<Value, ExecutionError> {
        let value = match self.eval_expr(&lambda.body) {
            Ok(value) => value,
            Err(Flow::Jump { target, value }) if is_label_of(&lambda.body, &target) => value,
            Err(Flow::Jump { target, .. }) => {
                return Err(ExecutionError::InvalidJump {
                    label: target.display_name().to_string(),
                });
            }
            Err(Flow::Error(error)) => return Err(error),
        };
        Ok(if lambda.signature.ret.is_void() {
            Value::Unit
        } else {
            value
        })
    }

    fn eval_expr(&mut self, expr: &Expr) -> EvalResult {
        let depth = self.depth.get();
        if depth >= self.options.max_depth {
            return Err(ExecutionError::from(ResourceExceededError::StackOverflow {
                depth,
                max_depth: self.options.max_depth,
            })
            .into());
        }
        self.depth.set(depth + 1);
        let result = self.eval_expr_inner(expr);
        self.depth.set(depth);
        result
    }

    fn eval_expr_inner(&mut self, expr: &Expr) -> EvalResult {
        match &expr.kind {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Parameter(param) => Ok(self.lookup(param)?.borrow().clone()),
            ExprKind::Default => Ok(Value::default_for(&expr.ty)),
            ExprKind::Unary {
                op,
                operand,
                method,
            } => self.eval_unary(expr, *op, operand.as_ref(), method.as_ref()),
            ExprKind::Binary {
                op,
                left,
                right,
                method,
            } => self.eval_binary(expr, *op, left, right, method.as_ref()),
            ExprKind::Call {
                object,
                method,
                args,
            } => self.eval_call(object.as_ref(), method, args),
            ExprKind::New(new) => self.eval_new(new),
            ExprKind::MemberAccess { object, member } => self.eval_member(object, member),
            ExprKind::Index {
                object,
                indexer,
                args,
            } => {
                let place = self.eval_index_place(object, indexer.as_ref(), args, false)?;
                Ok(self.read_place(&place)?)
            }
            ExprKind::NewArray { element, init } => self.eval_new_array(element, init),
            ExprKind::MemberInit { new, bindings } => self.eval_member_init(new, bindings),
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if self.eval_bool(test)? {
                    self.eval_expr(if_true)
                } else {
                    self.eval_expr(if_false)
                }
            }
            ExprKind::Block { variables, exprs } => self.eval_block(variables, exprs),
            ExprKind::Loop {
                body,
                break_label,
                continue_label,
            } => self.eval_loop(body, break_label.as_ref(), continue_label.as_ref()),
            ExprKind::Try(node) => self.eval_try(node),
            ExprKind::Label { target, default } => match default {
                Some(default) => self.eval_expr(default),
                None => Ok(Value::default_for(&target.ty)),
            },
            ExprKind::Goto { target, value, .. } => {
                let value = match value {
                    Some(value) => self.eval_expr(value)?,
                    None => Value::Unit,
                };
                Err(Flow::Jump {
                    target: target.clone(),
                    value,
                })
            }
            ExprKind::Switch(node) => self.eval_switch(expr, node),
            ExprKind::Lambda(lambda) => Ok(Value::Function(Rc::new(InterpretedLambda {
                lambda: lambda.clone(),
                captured: Rc::from(self.scopes.bindings()),
                options: self.options,
                depth: self.depth.clone(),
            }))),
            ExprKind::Invoke { target, args } => {
                let target = self.eval_expr(target)?;
                let args = self.eval_all(args)?;
                match target {
                    Value::Function(function) => Ok(function.call(&args)?),
                    Value::Null => Err(Exception::null_reference().into()),
                    other => Err(ExecutionError::internal(format!("invoke on {:?}", other)).into()),
                }
            }
        }
    }

    // === Helpers ===

    fn lookup(&self, param: &Rc<ParameterExpr>) -> Result<SharedCell, ExecutionError> {
        self.scopes
            .lookup(&ParamKey::of(param))
            .cloned()
            .ok_or_else(|| ExecutionError::internal(format!("undefined variable '{}'", param.name)))
    }

    fn eval_bool(&mut self, expr: &Expr) -> EvalResult<bool> {
        let value = self.eval_expr(expr)?;
        value
            .as_bool()
            .ok_or_else(|| ExecutionError::internal(format!("expected bool, got {:?}", value)).into())
    }

    fn eval_all(&mut self, exprs: &[ExprRef]) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval_expr(expr)).collect()
    }

    /// Runs `f` in a new scope holding `bindings`.
    fn with_scope<R>(
        &mut self,
        bindings: impl IntoIterator<Item = (ParamKey, SharedCell)>,
        f: impl FnOnce(&mut Self) -> EvalResult<R>,
    ) -> EvalResult<R> {
        self.scopes.push_scope();
        for (key, cell) in bindings {
            self.scopes.bind(key, cell);
        }
        let result = f(self);
        self.scopes
            .pop_scope()
            .map_err(|e| ExecutionError::internal(e.to_string()))?;
        result
    }

    // === Operators ===

    fn eval_unary(
        &mut self,
        expr: &Expr,
        op: UnaryOp,
        operand: Option<&ExprRef>,
        method: Option<&Rc<MethodDef>>,
    ) -> EvalResult {
        let Some(operand) = operand else {
            return match self.caught.last() {
                Some(exception) => Err(ExecutionError::Thrown(exception.clone()).into()),
                None => Err(Exception::new(
                    ExceptionKind::InvalidOperation,
                    "No exception is being handled.",
                )
                .into()),
            };
        };
        if op.is_assignment() {
            return self.eval_increment_assign(op, operand);
        }
        let value = self.eval_expr(operand)?;
        if let Some(method) = method {
            if value.is_null() && method.params.first().is_some_and(|p| !p.is_nullable()) {
                return Ok(Value::Null);
            }
            return Ok((method.body)(None, &[value])?);
        }
        let result = match op {
            UnaryOp::Throw => {
                if value.is_null() {
                    return Err(Exception::null_reference().into());
                }
                return Err(ExecutionError::Thrown(value).into());
            }
            UnaryOp::UnaryPlus => value,
            UnaryOp::Convert => operators::convert_to(value, &operand.ty, &expr.ty)?,
            UnaryOp::ArrayLength => match value {
                Value::Array(items) => Value::I32(items.borrow().len() as i32),
                Value::Null => return Err(Exception::null_reference().into()),
                other => {
                    return Err(
                        ExecutionError::internal(format!("array length of {:?}", other)).into()
                    );
                }
            },
            _ if value.is_null() => Value::Null,
            UnaryOp::Negate => operators::negate(&value)?,
            UnaryOp::Not => operators::not(&value)?,
            UnaryOp::Increment | UnaryOp::Decrement => self.step(op, value)?,
            _ => return Err(ExecutionError::internal(format!("unary {:?}", op)).into()),
        };
        Ok(result)
    }

    /// Adds or subtracts one, in the value's own kind.
    fn step(&self, op: UnaryOp, value: Value) -> Result<Value, ExecutionError> {
        let kind = value
            .num_kind()
            .ok_or_else(|| ExecutionError::internal(format!("{:?} of {:?}", op, value)))?;
        let arith = match op {
            UnaryOp::Increment | UnaryOp::PreIncrementAssign | UnaryOp::PostIncrementAssign => {
                operators::ArithOp::Add
            }
            _ => operators::ArithOp::Sub,
        };
        operators::arith(arith, &value, &operators::one(kind))
    }

    fn eval_increment_assign(&mut self, op: UnaryOp, target: &Expr) -> EvalResult {
        let place = self.eval_place(target)?;
        let old = self.read_place(&place)?;
        let new = if old.is_null() {
            Value::Null
        } else {
            self.step(op, old.clone())?
        };
        self.write_place(place, new.clone())?;
        Ok(match op {
            UnaryOp::PostIncrementAssign | UnaryOp::PostDecrementAssign => old,
            _ => new,
        })
    }

    fn eval_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        method: Option<&Rc<MethodDef>>,
    ) -> EvalResult {
        match op {
            BinaryOp::Assign => {
                let place = self.eval_place(left)?;
                let value = self.eval_expr(right)?;
                self.write_place(place, value.clone())?;
                return Ok(value);
            }
            BinaryOp::AndAlso => {
                return match self.eval_bool(left)? {
                    false => Ok(Value::Bool(false)),
                    true => self.eval_expr(right),
                };
            }
            BinaryOp::OrElse => {
                return match self.eval_bool(left)? {
                    true => Ok(Value::Bool(true)),
                    false => self.eval_expr(right),
                };
            }
            BinaryOp::Coalesce => {
                let value = self.eval_expr(left)?;
                if !value.is_null() {
                    return Ok(value);
                }
                let fallback = self.eval_expr(right)?;
                return Ok(operators::convert_to(fallback, &right.ty, &expr.ty)?);
            }
            _ => {}
        }

        if let Some(base) = op.compound_base() {
            let place = self.eval_place(left)?;
            let current = self.read_place(&place)?;
            let operand = self.eval_expr(right)?;
            let (result, ty) =
                self.apply_binary(base, &left.ty, current, &right.ty, operand, method)?;
            let result = operators::convert_to(result, &ty, &left.ty)?;
            self.write_place(place, result.clone())?;
            return Ok(result);
        }

        let left_value = self.eval_expr(left)?;
        let right_value = self.eval_expr(right)?;
        let (result, _) =
            self.apply_binary(op, &left.ty, left_value, &right.ty, right_value, method)?;
        Ok(result)
    }

    /// Applies a non-assigning binary operator to evaluated operands.
    /// Returns the result and its type.
    fn apply_binary(
        &self,
        op: BinaryOp,
        left_ty: &Type,
        left: Value,
        right_ty: &Type,
        right: Value,
        method: Option<&Rc<MethodDef>>,
    ) -> Result<(Value, Type), ExecutionError> {
        let method = match method {
            Some(method) => Some(method.clone()),
            None => op.find_operator_method(left_ty, right_ty),
        };
        if let Some(method) = method {
            let missing = [&left, &right]
                .into_iter()
                .zip(&method.params)
                .any(|(value, param)| value.is_null() && !param.is_nullable());
            if missing {
                let result = match op {
                    BinaryOp::Equal => Value::Bool(left.is_null() && right.is_null()),
                    BinaryOp::NotEqual => Value::Bool(left.is_null() != right.is_null()),
                    _ => lifted_miss(op),
                };
                return Ok((result, method.ret.clone()));
            }
            let result = (method.body)(None, &[left, right])?;
            return Ok((result, method.ret.clone()));
        }

        match op {
            BinaryOp::Add if *left_ty == Type::Str && *right_ty == Type::Str => {
                return Ok((operators::concat(&left, &right)?, Type::Str));
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr
                if *left_ty == Type::Bool && *right_ty == Type::Bool =>
            {
                let arith = operators::arith_op(op)
                    .ok_or_else(|| ExecutionError::internal(format!("operator {:?}", op)))?;
                return Ok((operators::arith(arith, &left, &right)?, Type::Bool));
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let (left, right) = match operators::operation_kind(op, left_ty, right_ty) {
                    Some(kind) => (
                        operators::to_kind(left, kind)?,
                        operators::to_kind(right, kind)?,
                    ),
                    None => (left, right),
                };
                let equal = left.equals(&right);
                return Ok((Value::Bool(equal == (op == BinaryOp::Equal)), Type::Bool));
            }
            _ => {}
        }

        let kind = operators::operation_kind(op, left_ty, right_ty).ok_or_else(|| {
            ExecutionError::internal(format!("no operator {:?} for {}", op, left_ty))
        })?;
        let right_kind = match op {
            BinaryOp::LeftShift | BinaryOp::RightShift => NumKind::I32,
            _ => kind,
        };
        let lifted = operators::is_lifted(left_ty, right_ty);
        let ty = match (op.is_comparison(), lifted) {
            (true, _) => Type::Bool,
            (false, false) => Type::Num(kind),
            (false, true) => Type::nullable(Type::Num(kind)),
        };
        if lifted && (left.is_null() || right.is_null()) {
            return Ok((lifted_miss(op), ty));
        }

        let left = operators::to_kind(left, kind)?;
        let right = operators::to_kind(right, right_kind)?;
        let result = match (operators::cmp_op(op), operators::arith_op(op)) {
            (Some(cmp), _) => Value::Bool(operators::compare(cmp, &left, &right)?),
            (None, Some(arith)) => operators::arith(arith, &left, &right)?,
            (None, None) => {
                return Err(ExecutionError::internal(format!("operator {:?}", op)));
            }
        };
        Ok((result, ty))
    }

    // === Places ===

    /// Evaluates a receiver. Value-struct variables are used in place when
    /// `by_address` is set.
    fn eval_receiver(&mut self, object: &Expr, by_address: bool) -> EvalResult<Receiver> {
        if by_address && object.ty.is_value_struct() {
            if let ExprKind::Parameter(param) = &object.kind {
                return Ok(Receiver::Var(self.lookup(param)?));
            }
        }
        Ok(Receiver::Value(self.eval_expr(object)?))
    }

    fn eval_place(&mut self, target: &Expr) -> EvalResult<Place> {
        match &target.kind {
            ExprKind::Parameter(param) => Ok(Place::Var(self.lookup(param)?)),
            ExprKind::MemberAccess { object, member } => Ok(Place::Member {
                receiver: self.eval_receiver(object, true)?,
                member: member.clone(),
            }),
            ExprKind::Index {
                object,
                indexer,
                args,
            } => self.eval_index_place(object, indexer.as_ref(), args, true),
            _ => Err(ExecutionError::internal(format!(
                "assignment to a {} node",
                target.kind_name()
            ))
            .into()),
        }
    }

    fn eval_index_place(
        &mut self,
        object: &Expr,
        indexer: Option<&Rc<Indexer>>,
        args: &[ExprRef],
        store: bool,
    ) -> EvalResult<Place> {
        match indexer {
            None => {
                let array = self.eval_expr(object)?;
                let index = match args {
                    [index] => self.eval_expr(index)?,
                    _ => {
                        return Err(ExecutionError::internal(format!(
                            "array index with {} arguments",
                            args.len()
                        ))
                        .into());
                    }
                };
                Ok(Place::Element { array, index })
            }
            Some(indexer) => {
                let accessor = match (store, &indexer.setter) {
                    (true, Some(setter)) => setter,
                    _ => &indexer.getter,
                };
                let receiver = self.eval_receiver(object, accessor.mutates_receiver)?;
                Ok(Place::Indexer {
                    receiver,
                    indexer: indexer.clone(),
                    args: self.eval_all(args)?,
                })
            }
        }
    }

    fn read_place(&self, place: &Place) -> Result<Value, ExecutionError> {
        match place {
            Place::Var(cell) => Ok(cell.borrow().clone()),
            Place::Member { receiver, member } => match member {
                Member::Field { index, .. } => match receiver {
                    Receiver::Var(cell) => cell.borrow().field(*index),
                    Receiver::Value(value) => value.field(*index),
                },
                Member::Property { getter, .. } => call_on(receiver, getter, &[], false),
            },
            Place::Element { array, index } => {
                array.with_element(index, |items, i| items[i].clone())
            }
            Place::Indexer {
                receiver,
                indexer,
                args,
            } => call_on(receiver, &indexer.getter, args, false),
        }
    }

    fn write_place(&self, place: Place, value: Value) -> Result<(), ExecutionError> {
        let read_only = |what: &str| ExecutionError::internal(format!("{} has no setter", what));
        match place {
            Place::Var(cell) => *cell.borrow_mut() = value,
            Place::Member { receiver, member } => match member {
                // Objects share their storage; a struct copy is updated and
                // dropped.
                Member::Field { index, .. } => match receiver {
                    Receiver::Var(cell) => cell.borrow_mut().set_field(index, value)?,
                    Receiver::Value(mut copy) => copy.set_field(index, value)?,
                },
                Member::Property { name, setter, .. } => {
                    let setter = setter.ok_or_else(|| read_only(&name))?;
                    call_on(&receiver, &setter, &[value], false)?;
                }
            },
            Place::Element { array, index } => {
                array.with_element(&index, |items, i| items[i] = value)?
            }
            Place::Indexer {
                receiver,
                indexer,
                mut args,
            } => {
                let setter = indexer.setter.clone().ok_or_else(|| read_only("indexer"))?;
                args.push(value);
                call_on(&receiver, &setter, &args, false)?;
            }
        }
        Ok(())
    }

    // === Members ===

    fn eval_call(
        &mut self,
        object: Option<&ExprRef>,
        method: &Rc<MethodDef>,
        args: &[ExprRef],
    ) -> EvalResult {
        match object {
            None => {
                let args = self.eval_all(args)?;
                Ok((method.body)(None, &args)?)
            }
            Some(object) => {
                let receiver = self.eval_receiver(object, method.mutates_receiver)?;
                let args = self.eval_all(args)?;
                let is_virtual = method.is_virtual && object.ty.is_reference();
                Ok(call_on(&receiver, method, &args, is_virtual)?)
            }
        }
    }

    fn eval_new(&mut self, new: &NewExpr) -> EvalResult {
        let args = self.eval_all(&new.args)?;
        Ok(match &new.constructor {
            Some(constructor) => (constructor.body)(None, &args)?,
            None => Value::new_struct(&new.def, args),
        })
    }

    fn eval_member(&mut self, object: &Expr, member: &Member) -> EvalResult {
        match member {
            Member::Property { getter, .. } if getter.is_static => {
                self.eval_expr(object)?;
                Ok((getter.body)(None, &[])?)
            }
            Member::Property { getter, .. } => {
                let receiver = self.eval_receiver(object, getter.mutates_receiver)?;
                Ok(call_on(&receiver, getter, &[], false)?)
            }
            Member::Field { .. } => {
                let receiver = Receiver::Value(self.eval_expr(object)?);
                Ok(self.read_place(&Place::Member {
                    receiver,
                    member: member.clone(),
                })?)
            }
        }
    }

    fn eval_member_init(&mut self, new: &NewExpr, bindings: &[MemberBinding]) -> EvalResult {
        // Bindings go through a temporary variable so value structs are
        // updated in place; class instances share their storage anyway.
        let instance = new_cell(self.eval_new(new)?);
        for MemberBinding::Assign(member, value) in bindings {
            let value = self.eval_expr(value)?;
            let place = Place::Member {
                receiver: Receiver::Var(instance.clone()),
                member: member.clone(),
            };
            self.write_place(place, value)?;
        }
        let value = instance.borrow().clone();
        Ok(value)
    }

    fn eval_new_array(&mut self, element: &Type, init: &ArrayInit) -> EvalResult {
        match init {
            ArrayInit::Elements(items) => Ok(Value::array(self.eval_all(items)?)),
            ArrayInit::Bounds(length) => {
                let length = self.eval_expr(length)?;
                let length = length.as_index().ok_or_else(|| {
                    ExecutionError::internal(format!("array length {:?}", length))
                })?;
                if length < 0 {
                    return Err(Exception::new(
                        ExceptionKind::Argument,
                        format!("Array length {} is negative.", length),
                    )
                    .into());
                }
                Ok(Value::array(alloc::vec![
                    Value::default_for(element);
                    length as usize
                ]))
            }
        }
    }

    // === Control Flow ===

    fn eval_block(&mut self, variables: &[Rc<ParameterExpr>], exprs: &[ExprRef]) -> EvalResult {
        let bindings = variables
            .iter()
            .map(|var| (ParamKey::of(var), new_cell(Value::default_for(&var.ty))));
        self.with_scope(bindings, |this| this.eval_sequence(exprs))
    }

    /// Evaluates statements in order. A jump to a label that is one of the
    /// statements resumes right after it, with the label taking the carried
    /// value.
    fn eval_sequence(&mut self, exprs: &[ExprRef]) -> EvalResult {
        let mut value = Value::Unit;
        let mut next = 0;
        while let Some(expr) = exprs.get(next) {
            match self.eval_expr(expr) {
                Ok(result) => {
                    value = result;
                    next += 1;
                }
                Err(Flow::Jump { target, value: carried }) => {
                    match exprs.iter().position(|e| is_label_of(e, &target)) {
                        Some(at) => {
                            value = carried;
                            next = at + 1;
                        }
                        None => {
                            return Err(Flow::Jump {
                                target,
                                value: carried,
                            });
                        }
                    }
                }
                Err(error) => return Err(error),
            }
        }
        Ok(value)
    }

    fn eval_loop(
        &mut self,
        body: &Expr,
        break_label: Option<&Rc<LabelTarget>>,
        continue_label: Option<&Rc<LabelTarget>>,
    ) -> EvalResult {
        let is = |label: Option<&Rc<LabelTarget>>, target: &Rc<LabelTarget>| {
            label.is_some_and(|label| LabelKey::of(label) == LabelKey::of(target))
        };
        loop {
            match self.eval_expr(body) {
                Ok(_) => {}
                Err(Flow::Jump { target, value }) if is(break_label, &target) => return Ok(value),
                Err(Flow::Jump { target, .. }) if is(continue_label, &target) => {}
                Err(flow) => return Err(flow),
            }
        }
    }

    fn eval_try(&mut self, node: &TryExpr) -> EvalResult {
        let mut outcome = self.eval_expr(&node.body);
        let in_flight = match &outcome {
            Err(Flow::Error(ExecutionError::Thrown(exception))) => Some(exception.clone()),
            _ => None,
        };
        if let Some(handled) = in_flight.and_then(|exception| self.eval_catch(node, &exception)) {
            outcome = handled;
        }

        // Errors other than exceptions skip every handler.
        let thrown = matches!(outcome, Err(Flow::Error(ExecutionError::Thrown(_))));
        let fatal = matches!(&outcome, Err(Flow::Error(error)) if error.thrown().is_none());
        if let Some(fault) = &node.fault {
            if thrown {
                self.eval_expr(fault)?;
            }
        }
        if let Some(finally) = &node.finally {
            if !fatal {
                self.eval_expr(finally)?;
            }
        }
        outcome
    }

    /// Runs the first catch block taking `exception`; `None` when none does.
    fn eval_catch(&mut self, node: &TryExpr, exception: &Value) -> Option<EvalResult> {
        for catch in &node.handlers {
            if !exception.is_instance_of(&catch.test) {
                continue;
            }
            let bindings = catch
                .variable
                .iter()
                .map(|var| (ParamKey::of(var), new_cell(exception.clone())));
            let handled = self.with_scope(bindings, |this| {
                if let Some(filter) = &catch.filter {
                    // A failing filter declines the exception.
                    if !matches!(this.eval_expr(filter), Ok(Value::Bool(true))) {
                        return Ok(None);
                    }
                }
                this.caught.push(exception.clone());
                let result = this.eval_expr(&catch.body);
                this.caught.pop();
                result.map(Some)
            });
            match handled {
                Ok(None) => continue,
                Ok(Some(value)) => return Some(Ok(value)),
                Err(flow) => return Some(Err(flow)),
            }
        }
        None
    }

    fn eval_switch(&mut self, expr: &Expr, node: &SwitchExpr) -> EvalResult {
        let value = self.eval_expr(&node.value)?;
        for case in &node.cases {
            for test in &case.tests {
                let candidate = self.eval_expr(test)?;
                let (matched, _) = self.apply_binary(
                    BinaryOp::Equal,
                    &node.value.ty,
                    value.clone(),
                    &test.ty,
                    candidate,
                    node.comparison.as_ref(),
                )?;
                if matched.as_bool() == Some(true) {
                    return self.eval_expr(&case.body);
                }
            }
        }
        match &node.default {
            Some(default) => self.eval_expr(default),
            None if expr.ty.is_void() => Ok(Value::Unit),
            None => Err(Exception::new(
                ExceptionKind::InvalidOperation,
                format!("No case matched the switch value {:?}.", value),
            )
            .into()),
        }
    }
}

/// Calls an instance method on a receiver. A receiver held in a variable is
/// updated with whatever the method leaves in it.
fn call_on(
    receiver: &Receiver,
    method: &Rc<MethodDef>,
    args: &[Value],
    is_virtual: bool,
) -> Result<Value, ExecutionError> {
    if method.is_static {
        return (method.body)(None, args);
    }
    let mut value = match receiver {
        Receiver::Var(cell) => cell.borrow().clone(),
        Receiver::Value(value) => value.clone(),
    };
    if value.is_null() {
        return Err(Exception::null_reference().into());
    }
    let method = match is_virtual {
        true => value
            .struct_def()
            .and_then(|def| def.find_method(&method.name))
            .unwrap_or_else(|| method.clone()),
        false => method.clone(),
    };
    let result = (method.body)(Some(&mut value), args);
    if let Receiver::Var(cell) = receiver {
        *cell.borrow_mut() = value;
    }
    result
}
