//! Conditionals, blocks, loops, labels, jumps and switches.

use alloc::rc::Rc;

use smallvec::SmallVec;

use super::{EmitFlags, Emitter, LabelId};
use crate::{
    Vec,
    ast::{BinaryOp, Expr, ExprRef, LabelTarget, ParameterExpr, SwitchExpr},
    compiler::error::{PassResult, Unsupported},
    values::Value,
    vm::Instruction,
};

impl<'e, 's> Emitter<'e, 's> {
    /// Flags for a child producing the parent's value, or discarding it.
    fn value_flags(expr: &Expr, flags: EmitFlags) -> EmitFlags {
        if flags.is_discarded() || expr.ty.is_void() {
            flags.discarded()
        } else {
            flags.child()
        }
    }

    pub(super) fn emit_conditional(
        &mut self,
        expr: &Expr,
        test: &Expr,
        if_true: &Expr,
        if_false: &Expr,
        flags: EmitFlags,
    ) -> PassResult {
        let branch_flags = Self::value_flags(expr, flags);
        let otherwise = self.new_label();
        let end = self.new_label();

        self.emit_branch(test, otherwise, false, flags)?;
        self.emit_expr(if_true, branch_flags)?;
        self.jump(Instruction::Jump(0), end)?;
        self.place(otherwise)?;
        self.emit_expr(if_false, branch_flags)?;
        self.place(end)
    }

    pub(super) fn emit_block(
        &mut self,
        expr: &Expr,
        variables: &[Rc<ParameterExpr>],
        exprs: &[ExprRef],
        flags: EmitFlags,
    ) -> PassResult {
        let mut shadowed: SmallVec<[Option<u32>; 4]> = SmallVec::new();
        for var in variables {
            let (slot, previous) = self.declare(var)?;
            self.emit_value(&Value::default_for(&var.ty))?;
            self.init_var(var, slot);
            shadowed.push(previous);
        }

        let last_flags = Self::value_flags(expr, flags);
        if let Some((last, init)) = exprs.split_last() {
            for statement in init {
                self.emit_expr(statement, flags.discarded())?;
            }
            self.emit_expr(last, last_flags)?;
        }

        for (var, previous) in variables.iter().zip(shadowed) {
            self.undeclare(var, previous);
        }
        Ok(())
    }

    pub(super) fn emit_loop(
        &mut self,
        expr: &Expr,
        body: &Expr,
        break_label: Option<&Rc<LabelTarget>>,
        continue_label: Option<&Rc<LabelTarget>>,
        flags: EmitFlags,
    ) -> PassResult {
        let top = match continue_label {
            Some(label) => self.user_label(label)?,
            None => self.new_label(),
        };
        let exit = break_label.map(|label| self.user_label(label)).transpose()?;

        self.place(top)?;
        self.emit_expr(body, flags.discarded())?;
        self.jump(Instruction::Jump(0), top)?;

        if let Some(exit) = exit {
            self.place(exit)?;
            self.load_label_value(exit, expr, flags);
        }
        Ok(())
    }

    fn load_label_value(&mut self, id: LabelId, expr: &Expr, flags: EmitFlags) {
        if flags.is_discarded() || expr.ty.is_void() {
            return;
        }
        if let Some(slot) = self.label_value_slot(id) {
            self.emit(Instruction::LoadLocal(slot));
        }
    }

    pub(super) fn emit_label(
        &mut self,
        expr: &Expr,
        target: &Rc<LabelTarget>,
        default: Option<&ExprRef>,
        flags: EmitFlags,
    ) -> PassResult {
        let id = self.user_label(target)?;
        if let Some(default) = default {
            self.emit_label_value(id, default, flags)?;
        }
        self.place(id)?;
        self.load_label_value(id, expr, flags);
        Ok(())
    }

    /// Stores the value carried to a label in the label's slot.
    fn emit_label_value(&mut self, id: LabelId, value: &Expr, flags: EmitFlags) -> PassResult {
        match self.label_value_slot(id) {
            Some(slot) => {
                self.emit_expr(value, flags.child())?;
                self.emit(Instruction::StoreLocal(slot));
                Ok(())
            }
            None => self.emit_expr(value, flags.discarded()),
        }
    }

    pub(super) fn emit_goto(
        &mut self,
        expr: &Expr,
        target: &Rc<LabelTarget>,
        value: Option<&ExprRef>,
        flags: EmitFlags,
    ) -> PassResult {
        let id = self.user_label(target)?;
        if let Some(value) = value {
            self.emit_label_value(id, value, flags)?;
        }
        // Inside a protected region every exit runs the finally blocks it
        // crosses.
        let instruction = if flags.contains(EmitFlags::IN_TRY) {
            Instruction::Leave(0)
        } else {
            Instruction::Jump(0)
        };
        self.jump(instruction, id)?;
        if !flags.is_discarded() && !expr.ty.is_void() {
            self.push_phantom();
        }
        Ok(())
    }

    pub(super) fn emit_switch(
        &mut self,
        expr: &Expr,
        node: &SwitchExpr,
        flags: EmitFlags,
    ) -> PassResult {
        if node.default.is_none() && !expr.ty.is_void() {
            return Err(Unsupported::SwitchWithoutDefault.into());
        }
        let body_flags = Self::value_flags(expr, flags);

        self.emit_expr(&node.value, flags.child())?;
        let value = self.alloc_slot()?;
        self.emit(Instruction::StoreLocal(value));

        let end = self.new_label();
        let cases: Vec<LabelId> = node.cases.iter().map(|_| self.new_label()).collect();
        for (case, &label) in node.cases.iter().zip(&cases) {
            for test in &case.tests {
                self.emit(Instruction::LoadLocal(value));
                self.emit_binary_rest(
                    BinaryOp::Equal,
                    &node.value.ty,
                    test,
                    node.comparison.as_ref(),
                    flags.child(),
                )?;
                self.jump(Instruction::JumpIfTrue(0), label)?;
            }
        }

        if let Some(default) = &node.default {
            self.emit_expr(default, body_flags)?;
        }
        self.jump(Instruction::Jump(0), end)?;

        for (i, (case, &label)) in node.cases.iter().zip(&cases).enumerate() {
            self.place(label)?;
            self.emit_expr(&case.body, body_flags)?;
            if i + 1 < cases.len() {
                self.jump(Instruction::Jump(0), end)?;
            }
        }
        self.place(end)
    }
}
