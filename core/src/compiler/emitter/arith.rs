//! Operators, conversions and assignments.
//!
//! Numeric operands are converted to the operation kind before the
//! instruction for that kind is emitted. Nullable operands take the lifted
//! lowering: both are spilled to temporaries and a missing value short-cuts
//! to null (arithmetic) or `false` (ordering).

use alloc::rc::Rc;

use super::{EmitFlags, Emitter};
use crate::{
    ast::{BinaryOp, Expr, ExprKind, ExprRef, UnaryOp},
    compiler::error::{CompileError, PassResult, Unsupported},
    evaluator::{ArithOp, operators},
    types::{Member, MethodDef, NumKind, Type},
    values::Value,
    vm::Instruction,
};

/// Whether a nullable operand reaches a method parameter that cannot hold
/// null, which would need a lifted call.
fn needs_lifted_call(method: &MethodDef, operands: &[&Type]) -> bool {
    operands
        .iter()
        .zip(&method.params)
        .any(|(operand, param)| operand.is_nullable() && !param.is_nullable())
}

fn constant_bool(expr: &Expr) -> Option<bool> {
    match &expr.kind {
        ExprKind::Constant(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

impl<'e, 's> Emitter<'e, 's> {
    // === Conversions ===

    /// Converts the value on top of the stack from `from` to `to`.
    pub(super) fn emit_conversion(&mut self, from: &Type, to: &Type) -> PassResult {
        if from == to {
            return Ok(());
        }
        if let (Some(source), Some(target)) = (from.lifted_num_kind(), to.lifted_num_kind()) {
            match (from.is_nullable(), to.is_nullable()) {
                (false, _) => {
                    if source != target {
                        self.emit(Instruction::Convert(target));
                    }
                }
                (true, true) => {
                    if source != target {
                        let end = self.new_label();
                        self.emit(Instruction::Dup);
                        self.jump(Instruction::JumpIfNull(0), end)?;
                        self.emit(Instruction::Convert(target));
                        self.place(end)?;
                    }
                }
                (true, false) => {
                    self.emit(Instruction::UnwrapNullable);
                    if source != target {
                        self.emit(Instruction::Convert(target));
                    }
                }
            }
            return Ok(());
        }
        if to.is_nullable() && to.underlying() == from {
            return Ok(());
        }
        if from.is_nullable() && from.underlying() == to {
            self.emit(Instruction::UnwrapNullable);
            return Ok(());
        }
        if !to.is_assignable_from(from) {
            let index = self.type_index(to)?;
            self.emit(Instruction::CastClass(index));
        }
        Ok(())
    }

    /// Converts the numeric value on top of the stack to `kind`. Nullable
    /// values are guarded unless the caller already checked them.
    fn emit_to_kind(&mut self, ty: &Type, kind: NumKind, flags: EmitFlags) -> PassResult {
        if ty.lifted_num_kind() == Some(kind) {
            return Ok(());
        }
        if ty.is_nullable() && !flags.contains(EmitFlags::ARITHMETIC_OPERAND) {
            let end = self.new_label();
            self.emit(Instruction::Dup);
            self.jump(Instruction::JumpIfNull(0), end)?;
            self.emit(Instruction::Convert(kind));
            self.place(end)
        } else {
            self.emit(Instruction::Convert(kind));
            Ok(())
        }
    }

    /// Emits `expr` converted to `kind`; numeric constants are converted at
    /// compile time.
    fn emit_operand(&mut self, expr: &Expr, kind: NumKind, flags: EmitFlags) -> PassResult {
        if let ExprKind::Constant(value) = &expr.kind {
            if value.num_kind().is_some() {
                if let Ok(folded) = operators::convert(value, kind) {
                    return self.emit_value(&folded);
                }
            }
        }
        self.emit_expr(expr, flags.child())?;
        self.emit_to_kind(&expr.ty, kind, flags)
    }

    // === Unary ===

    pub(super) fn emit_unary(
        &mut self,
        expr: &Expr,
        op: UnaryOp,
        operand: Option<&ExprRef>,
        method: Option<&Rc<MethodDef>>,
        flags: EmitFlags,
    ) -> PassResult {
        let Some(operand) = operand else {
            return self.emit_rethrow(expr, flags);
        };
        if let Some(method) = method {
            if needs_lifted_call(method, &[&operand.ty]) {
                return Err(Unsupported::LiftedOperatorMethod {
                    method: method.name.clone(),
                }
                .into());
            }
            self.emit_expr(operand, flags.child())?;
            self.emit_call(method, false)?;
            self.pop_if(flags.is_discarded() && !method.ret.is_void());
            return Ok(());
        }

        match op {
            UnaryOp::Throw => {
                self.emit_expr(operand, flags.child())?;
                self.emit(Instruction::Throw);
                if !flags.is_discarded() && !expr.ty.is_void() {
                    self.push_phantom();
                }
                Ok(())
            }
            UnaryOp::UnaryPlus => self.emit_expr(operand, flags.child() | (flags & EmitFlags::RESULT_DISCARDED)),
            UnaryOp::Convert => {
                self.emit_expr(operand, flags.child())?;
                self.emit_conversion(&operand.ty, &expr.ty)?;
                self.pop_if(flags.is_discarded());
                Ok(())
            }
            UnaryOp::ArrayLength => {
                self.emit_expr(operand, flags.child())?;
                self.emit(Instruction::ArrayLength);
                self.pop_if(flags.is_discarded());
                Ok(())
            }
            UnaryOp::Negate | UnaryOp::Not | UnaryOp::Increment | UnaryOp::Decrement => {
                self.emit_expr(operand, flags.child())?;
                self.emit_unary_op(op, &expr.ty)?;
                self.pop_if(flags.is_discarded());
                Ok(())
            }
            UnaryOp::PreIncrementAssign
            | UnaryOp::PreDecrementAssign
            | UnaryOp::PostIncrementAssign
            | UnaryOp::PostDecrementAssign => self.emit_increment_assign(op, operand, flags),
        }
    }

    /// Applies a primitive unary operator to the value on top of the stack,
    /// passing null through for nullable operands.
    fn emit_unary_op(&mut self, op: UnaryOp, ty: &Type) -> PassResult {
        let missing = || CompileError::MissingUnaryOperator { op, ty: ty.clone() };
        let guard = ty.is_nullable().then(|| self.new_label());
        if let Some(end) = guard {
            self.emit(Instruction::Dup);
            self.jump(Instruction::JumpIfNull(0), end)?;
        }
        match op {
            UnaryOp::Not => self.emit(Instruction::Not),
            UnaryOp::Negate => {
                let kind = ty.lifted_num_kind().ok_or_else(missing)?;
                self.emit(Instruction::Negate(kind));
            }
            UnaryOp::Increment | UnaryOp::Decrement => {
                let kind = ty.lifted_num_kind().ok_or_else(missing)?;
                let arith = if op == UnaryOp::Increment {
                    ArithOp::Add
                } else {
                    ArithOp::Sub
                };
                self.emit_value(&operators::one(kind))?;
                self.emit(Instruction::Arith(arith, kind));
            }
            _ => return Err(missing().into()),
        }
        if let Some(end) = guard {
            self.place(end)?;
        }
        Ok(())
    }

    fn emit_rethrow(&mut self, expr: &Expr, flags: EmitFlags) -> PassResult {
        let slot = *self
            .catch_slots
            .last()
            .ok_or(Unsupported::RethrowOutsideCatch)?;
        self.emit(Instruction::LoadLocal(slot));
        self.emit(Instruction::Throw);
        if !flags.is_discarded() && !expr.ty.is_void() {
            self.push_phantom();
        }
        Ok(())
    }

    fn emit_increment_assign(&mut self, op: UnaryOp, target: &Expr, flags: EmitFlags) -> PassResult {
        let ExprKind::Parameter(param) = &target.kind else {
            return Err(Unsupported::CompoundAssignTarget {
                kind: target.kind_name(),
            }
            .into());
        };
        let kind = target
            .ty
            .num_kind()
            .ok_or_else(|| CompileError::MissingUnaryOperator {
                op,
                ty: target.ty.clone(),
            })?;
        let var = self.resolve(param)?;
        let needed = !flags.is_discarded();
        let post = matches!(
            op,
            UnaryOp::PostIncrementAssign | UnaryOp::PostDecrementAssign
        );
        let arith = match op {
            UnaryOp::PreIncrementAssign | UnaryOp::PostIncrementAssign => ArithOp::Add,
            _ => ArithOp::Sub,
        };

        self.load_var(var, false);
        if needed && post {
            self.emit(Instruction::Dup);
        }
        self.emit_value(&operators::one(kind))?;
        self.emit(Instruction::Arith(arith, kind));
        if needed && !post {
            self.emit(Instruction::Dup);
        }
        self.store_var(var);
        Ok(())
    }

    // === Binary ===

    pub(super) fn emit_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &ExprRef,
        right: &ExprRef,
        method: Option<&Rc<MethodDef>>,
        flags: EmitFlags,
    ) -> PassResult {
        match op {
            BinaryOp::Assign => return self.emit_assign(left, right, flags),
            BinaryOp::AndAlso | BinaryOp::OrElse => {
                return self.emit_short_circuit(op, left, right, flags);
            }
            BinaryOp::Coalesce => return self.emit_coalesce(expr, left, right, flags),
            _ if op.compound_base().is_some() => {
                return self.emit_compound_assign(op, left, right, method, flags);
            }
            _ => {}
        }
        self.emit_expr(left, flags.child())?;
        self.emit_binary_rest(op, &left.ty, right, method, flags.child())?;
        self.pop_if(flags.is_discarded());
        Ok(())
    }

    /// Emits the right operand and the operator, with the left operand
    /// already on the stack. Returns the type of the value produced.
    pub(super) fn emit_binary_rest(
        &mut self,
        op: BinaryOp,
        left_ty: &Type,
        right: &Expr,
        method: Option<&Rc<MethodDef>>,
        flags: EmitFlags,
    ) -> PassResult<Type> {
        let missing = || CompileError::MissingOperator {
            op,
            ty: left_ty.clone(),
        };
        let method = match method {
            Some(method) => Some(method.clone()),
            None => op.find_operator_method(left_ty, &right.ty),
        };
        if let Some(method) = method {
            if !method.is_static || method.arity() != 2 {
                return Err(missing().into());
            }
            if needs_lifted_call(&method, &[left_ty, &right.ty]) {
                return Err(Unsupported::LiftedOperatorMethod {
                    method: method.name.clone(),
                }
                .into());
            }
            self.emit_expr(right, flags.child())?;
            self.emit_call(&method, false)?;
            return Ok(method.ret.clone());
        }

        match op {
            BinaryOp::Add if *left_ty == Type::Str && right.ty == Type::Str => {
                self.emit_expr(right, flags.child())?;
                self.emit(Instruction::Concat);
                return Ok(Type::Str);
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr
                if *left_ty == Type::Bool && right.ty == Type::Bool =>
            {
                let arith = operators::arith_op(op).ok_or_else(missing)?;
                self.emit_expr(right, flags.child())?;
                self.emit(Instruction::Logical(arith));
                return Ok(Type::Bool);
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                match operators::operation_kind(op, left_ty, &right.ty) {
                    Some(kind) => {
                        self.emit_to_kind(left_ty, kind, flags.child())?;
                        self.emit_operand(right, kind, flags.child())?;
                    }
                    None => self.emit_expr(right, flags.child())?,
                }
                self.emit(if op == BinaryOp::Equal {
                    Instruction::Eq
                } else {
                    Instruction::NotEq
                });
                return Ok(Type::Bool);
            }
            _ => {}
        }

        let kind = operators::operation_kind(op, left_ty, &right.ty).ok_or_else(missing)?;
        let right_kind = match op {
            BinaryOp::LeftShift | BinaryOp::RightShift => NumKind::I32,
            _ => kind,
        };
        let instruction = match (operators::cmp_op(op), operators::arith_op(op)) {
            (Some(cmp), _) => Instruction::Compare(cmp, kind),
            (None, Some(arith)) => Instruction::Arith(arith, kind),
            (None, None) => return Err(missing().into()),
        };
        let comparison = op.is_comparison();

        if !operators::is_lifted(left_ty, &right.ty) {
            self.emit_to_kind(left_ty, kind, flags.child())?;
            self.emit_operand(right, right_kind, flags.child())?;
            self.emit(instruction);
            return Ok(if comparison { Type::Bool } else { Type::Num(kind) });
        }

        // Lifted: spill both operands, then test them for null.
        let left_slot = self.alloc_slot()?;
        self.emit(Instruction::StoreLocal(left_slot));
        self.emit_expr(right, flags.child())?;
        let right_slot = self.alloc_slot()?;
        self.emit(Instruction::StoreLocal(right_slot));

        let no_value = self.new_label();
        let end = self.new_label();
        for (slot, ty) in [(left_slot, left_ty), (right_slot, &right.ty)] {
            if ty.admits_null() {
                self.emit(Instruction::LoadLocal(slot));
                self.jump(Instruction::JumpIfNull(0), no_value)?;
            }
        }
        let checked = flags.child() | EmitFlags::ARITHMETIC_OPERAND;
        self.emit(Instruction::LoadLocal(left_slot));
        self.emit_to_kind(left_ty, kind, checked)?;
        self.emit(Instruction::LoadLocal(right_slot));
        self.emit_to_kind(&right.ty, right_kind, checked)?;
        self.emit(instruction);
        self.jump(Instruction::Jump(0), end)?;

        self.place(no_value)?;
        if comparison {
            self.emit(Instruction::ConstBool(false));
        } else {
            self.emit(Instruction::ConstNull);
        }
        self.place(end)?;
        Ok(if comparison {
            Type::Bool
        } else {
            Type::nullable(Type::Num(kind))
        })
    }

    fn emit_short_circuit(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        flags: EmitFlags,
    ) -> PassResult {
        let is_and = op == BinaryOp::AndAlso;
        if flags.is_discarded() {
            let end = self.new_label();
            self.emit_branch(left, end, !is_and, flags)?;
            self.emit_expr(right, flags.discarded())?;
            return self.place(end);
        }
        if let Some(value) = constant_bool(left) {
            return if value == is_and {
                self.emit_expr(right, flags.child())
            } else {
                self.emit_value(&Value::Bool(value))
            };
        }
        let end = self.new_label();
        self.emit_expr(left, flags.child())?;
        self.emit(Instruction::Dup);
        let exit = if is_and {
            Instruction::JumpIfFalse(0)
        } else {
            Instruction::JumpIfTrue(0)
        };
        self.jump(exit, end)?;
        self.emit(Instruction::Pop);
        self.emit_expr(right, flags.child())?;
        self.place(end)
    }

    /// Emits a jump to `target` taken when `test` evaluates to `when`.
    /// Short-circuit operators and negations become jump chains; constant
    /// left operands of `AndAlso`/`OrElse` are folded.
    pub(super) fn emit_branch(
        &mut self,
        test: &Expr,
        target: super::LabelId,
        when: bool,
        flags: EmitFlags,
    ) -> PassResult {
        match &test.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Some(inner),
                method: None,
            } if test.ty == Type::Bool => self.emit_branch(inner, target, !when, flags),
            ExprKind::Binary {
                op: op @ (BinaryOp::AndAlso | BinaryOp::OrElse),
                left,
                right,
                ..
            } => {
                let is_and = *op == BinaryOp::AndAlso;
                if let Some(value) = constant_bool(left) {
                    if value == is_and {
                        return self.emit_branch(right, target, when, flags);
                    }
                    if value == when {
                        self.jump(Instruction::Jump(0), target)?;
                    }
                    return Ok(());
                }
                if is_and == when {
                    // Both operands must agree with `when`.
                    let skip = self.new_label();
                    self.emit_branch(left, skip, !when, flags)?;
                    self.emit_branch(right, target, when, flags)?;
                    self.place(skip)
                } else {
                    self.emit_branch(left, target, when, flags)?;
                    self.emit_branch(right, target, when, flags)
                }
            }
            _ => {
                self.emit_expr(test, flags.child())?;
                let jump = if when {
                    Instruction::JumpIfTrue(0)
                } else {
                    Instruction::JumpIfFalse(0)
                };
                self.jump(jump, target)
            }
        }
    }

    fn emit_coalesce(&mut self, expr: &Expr, left: &Expr, right: &Expr, flags: EmitFlags) -> PassResult {
        let end = self.new_label();
        self.emit_expr(left, flags.child())?;
        self.emit(Instruction::Dup);
        self.jump(Instruction::JumpIfNotNull(0), end)?;
        self.emit(Instruction::Pop);
        self.emit_expr(right, flags.child())?;
        self.emit_conversion(&right.ty, &expr.ty)?;
        self.place(end)?;
        self.pop_if(flags.is_discarded());
        Ok(())
    }

    // === Assignment ===

    fn emit_assign(&mut self, left: &Expr, right: &Expr, flags: EmitFlags) -> PassResult {
        match &left.kind {
            ExprKind::Parameter(param) => {
                let var = self.resolve(param)?;
                self.emit_expr(right, flags.child())?;
                if !flags.is_discarded() {
                    self.emit(Instruction::Dup);
                }
                self.store_var(var);
                Ok(())
            }
            ExprKind::MemberAccess { object, member } => {
                self.emit_member_assign(object, member, right, flags)
            }
            ExprKind::Index {
                object,
                indexer,
                args,
            } => self.emit_index_assign(object, indexer.as_ref(), args, right, flags),
            _ => Err(Unsupported::CompoundAssignTarget {
                kind: left.kind_name(),
            }
            .into()),
        }
    }

    fn emit_compound_assign(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        method: Option<&Rc<MethodDef>>,
        flags: EmitFlags,
    ) -> PassResult {
        let base = op.compound_base().ok_or(CompileError::MissingOperator {
            op,
            ty: left.ty.clone(),
        })?;
        let needed = !flags.is_discarded();
        match &left.kind {
            ExprKind::Parameter(param) => {
                let var = self.resolve(param)?;
                self.load_var(var, false);
                let result = self.emit_binary_rest(base, &left.ty, right, method, flags.child())?;
                self.emit_conversion(&result, &left.ty)?;
                if needed {
                    self.emit(Instruction::Dup);
                }
                self.store_var(var);
                Ok(())
            }
            ExprKind::MemberAccess {
                object,
                member: Member::Field { index, .. },
            } => {
                let index = *index as u32;
                self.emit_expr(object, flags.child() | EmitFlags::MEMBER_RECEIVER)?;
                let receiver = self.alloc_slot()?;
                self.emit(Instruction::StoreLocal(receiver));
                self.emit(Instruction::LoadLocal(receiver));
                self.emit(Instruction::LoadLocal(receiver));
                self.emit(Instruction::LoadField(index));
                let result = self.emit_binary_rest(base, &left.ty, right, method, flags.child())?;
                self.emit_conversion(&result, &left.ty)?;
                if needed {
                    let value = self.alloc_slot()?;
                    self.emit(Instruction::Dup);
                    self.emit(Instruction::StoreLocal(value));
                    self.emit(Instruction::StoreField(index));
                    self.emit(Instruction::LoadLocal(value));
                } else {
                    self.emit(Instruction::StoreField(index));
                }
                Ok(())
            }
            _ => Err(Unsupported::CompoundAssignTarget {
                kind: left.kind_name(),
            }
            .into()),
        }
    }
}
