//! Protected regions.
//!
//! A `try` becomes entries of the code's handler table rather than
//! instructions: one `Catch` entry per handler covering the body, and a
//! `Finally` or `Fault` entry covering the body and every catch block. Every
//! path out of the region goes through `Leave`, which enters the finally
//! blocks it crosses.

use super::{EmitFlags, Emitter};
use crate::{
    Vec,
    ast::{Expr, TryExpr, TryKey},
    compiler::error::PassResult,
    vm::{Handler, HandlerKind, Instruction},
};

impl<'e, 's> Emitter<'e, 's> {
    pub(super) fn emit_try(&mut self, expr: &Expr, node: &TryExpr, flags: EmitFlags) -> PassResult {
        let region = self.info.try_region(TryKey::of(node));
        let needed = !flags.is_discarded() && !expr.ty.is_void();
        let result = match !expr.ty.is_void() && (needed || region.contains_return) {
            true => Some(self.alloc_slot()?),
            false => None,
        };

        let depth = self.depth;
        let end = self.new_label();
        let inner = flags.child() | EmitFlags::IN_TRY;
        let block_flags = match result {
            Some(_) => inner,
            None => inner | EmitFlags::RESULT_DISCARDED,
        };

        // A label placed just before the region resolves to this `Nop`, so a
        // jump back to it leaves the region instead of landing inside it.
        self.emit(Instruction::Nop);
        let try_start = self.position();
        self.emit_expr(&node.body, block_flags)?;
        self.store_result(result);
        self.jump(Instruction::Leave(0), end)?;
        let try_end = self.position();

        let mut handlers = Vec::with_capacity(node.handlers.len() + 1);
        for catch in &node.handlers {
            self.enter_handler(depth);
            let target = self.position();
            let exception = self.alloc_slot()?;

            let binding = match &catch.variable {
                Some(var) => {
                    let (slot, previous) = self.declare(var)?;
                    self.emit(Instruction::LoadLocal(exception));
                    self.init_var(var, slot);
                    Some((var, previous))
                }
                None => None,
            };
            self.catch_slots.push(exception);
            let body = self.emit_expr(&catch.body, block_flags);
            self.catch_slots.pop();
            body?;
            if let Some((var, previous)) = binding {
                self.undeclare(var, previous);
            }

            self.store_result(result);
            self.jump(Instruction::Leave(0), end)?;
            handlers.push(Handler {
                try_start,
                try_end,
                stack_depth: depth,
                kind: HandlerKind::Catch {
                    test: catch.test.clone(),
                    slot: exception,
                    target,
                },
            });
        }
        let catches_end = self.position();

        let cleanup = match (&node.finally, &node.fault) {
            (Some(block), _) => Some((block, true)),
            (None, Some(block)) => Some((block, false)),
            (None, None) => None,
        };
        if let Some((block, is_finally)) = cleanup {
            self.enter_handler(depth);
            let target = self.position();
            let id = self.next_finally;
            self.next_finally += 1;
            self.finally_stack.push(id);
            let body = self.emit_expr(block, flags.discarded());
            self.finally_stack.pop();
            body?;
            self.emit(Instruction::EndFinally);
            let block_end = self.position();
            handlers.push(Handler {
                try_start,
                try_end: catches_end,
                stack_depth: depth,
                kind: if is_finally {
                    HandlerKind::Finally {
                        target,
                        end: block_end,
                    }
                } else {
                    HandlerKind::Fault {
                        target,
                        end: block_end,
                    }
                },
            });
        }

        // Regions nested in this one were completed first, so the table
        // stays ordered innermost first.
        self.handlers.extend(handlers);
        self.place(end)?;
        if needed {
            if let Some(slot) = result {
                self.emit(Instruction::LoadLocal(slot));
            }
        }
        Ok(())
    }

    fn store_result(&mut self, slot: Option<u32>) {
        if let Some(slot) = slot {
            self.emit(Instruction::StoreLocal(slot));
        }
    }
}
