//! References to nested units.
//!
//! A nested unit is already compiled when the unit creating it is emitted;
//! its compiled form sits in the enclosing record after the constants. A
//! bound unit is loaded as is. An open unit is loaded and curried with the
//! cells of the variables it captures.

use alloc::rc::Rc;

use super::{EmitFlags, Emitter};
use crate::{
    ToString,
    ast::LambdaExpr,
    compiler::closure_info::CompiledUnit,
    compiler::error::{CompileError, PassResult, Unsupported},
    vm::Instruction,
};

impl<'e, 's> Emitter<'e, 's> {
    pub(super) fn emit_lambda(&mut self, lambda: &Rc<LambdaExpr>, flags: EmitFlags) -> PassResult {
        if self.supplied.is_some() {
            return Err(Unsupported::NestedLambdaWithSuppliedClosure.into());
        }
        if flags.is_discarded() {
            return Ok(());
        }
        let unresolved = || CompileError::UnresolvedNestedUnit {
            name: lambda.display_name().to_string(),
        };

        let session = self.session;
        let unit = session.unit_of(lambda).ok_or_else(unresolved)?;
        let position = self.info.nested_position(unit).ok_or_else(unresolved)?;
        match self.info.nested[position].hoisted_slot {
            Some(slot) => self.emit(Instruction::LoadLocal(slot)),
            None => {
                let index = self.info.constants.len() + position;
                self.emit(Instruction::LoadConstant(index as u32));
            }
        }

        match &session.units[unit].compiled {
            Some(CompiledUnit::Bound(_)) => Ok(()),
            Some(CompiledUnit::Open { captures, .. }) => {
                let cells = self.capture_cells(captures)?;
                let count = cells.len() as u32;
                for cell in cells {
                    self.emit(cell);
                }
                self.emit(Instruction::Curry(count));
                Ok(())
            }
            None => Err(unresolved().into()),
        }
    }
}
