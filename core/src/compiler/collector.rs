//! First pass: builds the closure plan of a unit.
//!
//! The collector walks a lambda body once and records the identity
//! constants it references, the variables it captures from enclosing units,
//! the nested lambdas it creates (collected recursively, bottom-up), its
//! labels and its protected regions. Constructs the emitter cannot lower are
//! rejected here so a doomed compilation stops before any bytecode exists.

use alloc::rc::Rc;
use tracing::trace;

use super::closure_info::{ClosureInfo, ClosureStatus, NestedLambdaInfo, Session};
use super::error::{CompileError, PassResult, Unsupported};
use crate::{
    ToString,
    ast::{
        ArrayInit, Expr, ExprKind, GotoKind, LambdaExpr, LambdaKey, MemberBinding, ParamKey,
        ParameterExpr, TryKey,
    },
};

/// Collects the closure plan of `lambda` and, recursively, of every lambda
/// nested in it. Nested plans are appended to `session.units`.
pub(crate) fn collect<'s>(
    session: &mut Session<'s>,
    lambda: &Rc<LambdaExpr>,
    nested: bool,
) -> PassResult<ClosureInfo<'s>> {
    let arena = session.arena;
    let mut collector = Collector {
        session,
        info: ClosureInfo::new(arena, ClosureStatus::NEEDS_COLLECTION),
        params: &lambda.params,
        nested,
    };
    collector.visit(&lambda.body)?;

    let mut info = collector.info;
    info.status.remove(ClosureStatus::NEEDS_COLLECTION);
    if info.record_len() > 0 || !info.non_passed.is_empty() {
        info.status.insert(ClosureStatus::HAS_CLOSURE);
    }
    if info.non_passed.is_empty() {
        info.status.insert(ClosureStatus::MUST_BE_STATIC);
    }
    Ok(info)
}

struct Collector<'c, 's> {
    session: &'c mut Session<'s>,
    info: ClosureInfo<'s>,
    params: &'c [Rc<ParameterExpr>],
    nested: bool,
}

impl<'c, 's> Collector<'c, 's> {
    fn is_own_param(&self, key: ParamKey) -> bool {
        self.params.iter().any(|p| ParamKey::of(p) == key)
    }

    fn visit<'t>(&mut self, mut expr: &'t Expr) -> PassResult {
        // Sibling lists are walked left to right; the last child is visited
        // by continuing the loop instead of recursing.
        loop {
            match &expr.kind {
                ExprKind::Constant(value) => {
                    self.info.add_constant(value);
                    return Ok(());
                }
                ExprKind::Parameter(param) => return self.reference(param),
                ExprKind::Default => return Ok(()),

                ExprKind::Unary { operand, .. } => match operand {
                    Some(operand) => expr = operand.as_ref(),
                    None => return Ok(()),
                },
                ExprKind::Binary { left, right, .. } => {
                    self.visit(left)?;
                    expr = right.as_ref();
                }
                ExprKind::Call { object, args, .. } => {
                    if let Some(object) = object {
                        self.visit(object)?;
                    }
                    match self.visit_all_but_last(args)? {
                        Some(last) => expr = last,
                        None => return Ok(()),
                    }
                }
                ExprKind::New(new) => match self.visit_all_but_last(&new.args)? {
                    Some(last) => expr = last,
                    None => return Ok(()),
                },
                ExprKind::MemberAccess { object, .. } => expr = object.as_ref(),
                ExprKind::Index { object, args, .. } => {
                    self.visit(object)?;
                    match self.visit_all_but_last(args)? {
                        Some(last) => expr = last,
                        None => return Ok(()),
                    }
                }
                ExprKind::NewArray { init, .. } => match init {
                    ArrayInit::Elements(items) => match self.visit_all_but_last(items)? {
                        Some(last) => expr = last,
                        None => return Ok(()),
                    },
                    ArrayInit::Bounds(length) => expr = length.as_ref(),
                },
                ExprKind::MemberInit { new, bindings } => {
                    for arg in &new.args {
                        self.visit(arg)?;
                    }
                    let Some((last, init)) = bindings.split_last() else {
                        return Ok(());
                    };
                    for MemberBinding::Assign(_, value) in init {
                        self.visit(value)?;
                    }
                    let MemberBinding::Assign(_, value) = last;
                    expr = value.as_ref();
                }
                ExprKind::Invoke { target, args } => {
                    self.visit(target)?;
                    match self.visit_all_but_last(args)? {
                        Some(last) => expr = last,
                        None => return Ok(()),
                    }
                }
                ExprKind::Conditional {
                    test,
                    if_true,
                    if_false,
                } => {
                    self.visit(test)?;
                    self.visit(if_true)?;
                    expr = if_false.as_ref();
                }
                ExprKind::Block { variables, exprs } => {
                    self.info.push_block(variables);
                    let result = exprs.iter().try_for_each(|e| self.visit(e));
                    self.info.pop_block();
                    return result;
                }
                ExprKind::Loop {
                    body,
                    break_label,
                    continue_label,
                } => {
                    if let Some(label) = break_label {
                        self.info.register_label(label);
                    }
                    if let Some(label) = continue_label {
                        self.info.register_label(label);
                    }
                    expr = body.as_ref();
                }
                ExprKind::Label { target, default } => {
                    self.info.register_label(target);
                    match default {
                        Some(default) => expr = default.as_ref(),
                        None => return Ok(()),
                    }
                }
                ExprKind::Goto {
                    kind,
                    target,
                    value,
                } => {
                    if *kind == GotoKind::Return {
                        self.info.mark_return_in_try();
                    }
                    self.info.register_label(target);
                    match value {
                        Some(value) => expr = value.as_ref(),
                        None => return Ok(()),
                    }
                }
                ExprKind::Try(node) => {
                    self.info.push_try(TryKey::of(node));
                    let result = self.visit_try(node);
                    self.info.pop_try();
                    return result;
                }
                ExprKind::Switch(node) => {
                    if node.default.is_none() && !expr.ty.is_void() {
                        return Err(Unsupported::SwitchWithoutDefault.into());
                    }
                    self.visit(&node.value)?;
                    for case in &node.cases {
                        for test in &case.tests {
                            self.visit(test)?;
                        }
                        self.visit(&case.body)?;
                    }
                    match &node.default {
                        Some(default) => expr = default.as_ref(),
                        None => return Ok(()),
                    }
                }
                ExprKind::Lambda(lambda) => return self.visit_lambda(lambda),
            }
        }
    }

    fn visit_all_but_last<'t>(
        &mut self,
        exprs: &'t [crate::ast::ExprRef],
    ) -> PassResult<Option<&'t Expr>> {
        let Some((last, init)) = exprs.split_last() else {
            return Ok(None);
        };
        for expr in init {
            self.visit(expr)?;
        }
        Ok(Some(last.as_ref()))
    }

    fn visit_try(&mut self, node: &crate::ast::TryExpr) -> PassResult {
        self.visit(&node.body)?;
        for handler in &node.handlers {
            if handler.filter.is_some() {
                return Err(Unsupported::FilteredCatch.into());
            }
            let variables = handler.variable.as_slice();
            self.info.push_block(variables);
            let result = self.visit(&handler.body);
            self.info.pop_block();
            result?;
        }
        if let Some(finally) = &node.finally {
            self.visit(finally)?;
        }
        if let Some(fault) = &node.fault {
            self.visit(fault)?;
        }
        Ok(())
    }

    fn reference(&mut self, param: &Rc<ParameterExpr>) -> PassResult {
        let key = ParamKey::of(param);
        if self.is_own_param(key) || self.info.is_local(key) {
            return Ok(());
        }
        if self.nested {
            self.info.add_non_passed(param);
            return Ok(());
        }
        Err(CompileError::UndefinedVariable {
            name: param.name.to_string(),
        }
        .into())
    }

    fn visit_lambda(&mut self, lambda: &Rc<LambdaExpr>) -> PassResult {
        let unit = match self.session.unit_of(lambda) {
            Some(unit) => {
                self.session.units[unit].usage += 1;
                unit
            }
            None => {
                let info = collect(self.session, lambda, true)?;
                let unit = self.session.units.len();
                trace!(
                    unit,
                    name = lambda.display_name(),
                    captures = info.non_passed.len(),
                    constants = info.constants.len(),
                    "Discovered nested unit"
                );
                self.session.units.push(NestedLambdaInfo {
                    lambda: lambda.clone(),
                    info,
                    compiled: None,
                    usage: 1,
                });
                self.session.index.insert(LambdaKey::of(lambda), unit);
                unit
            }
        };
        self.info.add_nested(unit);

        // A variable the nested unit captures is either ours (and must live
        // in a cell) or comes from further out.
        let captures = self.session.units[unit].info.non_passed.len();
        for i in 0..captures {
            let param = self.session.units[unit].info.non_passed[i].clone();
            let key = ParamKey::of(&param);
            if self.is_own_param(key) || self.info.is_local(key) {
                self.info.boxed.insert(key);
            } else if self.nested {
                self.info.add_non_passed(&param);
            } else {
                return Err(CompileError::UndefinedVariable {
                    name: param.name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
