//! Calls, construction, fields, properties, indexers and arrays.

use alloc::rc::Rc;

use super::{EmitFlags, Emitter};
use crate::{
    ast::{ArrayInit, Expr, ExprRef, MemberBinding, NewExpr},
    compiler::error::{PassResult, Unsupported},
    types::{Indexer, Member, MethodDef, StructKind, Type},
    values::Value,
    vm::Instruction,
};

impl<'e, 's> Emitter<'e, 's> {
    /// Receiver flags for a call: value structs are passed by address so a
    /// mutating method updates the variable itself.
    fn receiver_flags(method: &MethodDef, receiver: &Type, flags: EmitFlags) -> EmitFlags {
        if method.mutates_receiver && receiver.is_value_struct() {
            flags.child() | EmitFlags::CALL_RECEIVER
        } else {
            flags.child()
        }
    }

    pub(super) fn emit_method_call(
        &mut self,
        object: Option<&ExprRef>,
        method: &Rc<MethodDef>,
        args: &[ExprRef],
        flags: EmitFlags,
    ) -> PassResult {
        let mut is_virtual = false;
        if let Some(object) = object {
            self.emit_expr(object, Self::receiver_flags(method, &object.ty, flags))?;
            is_virtual = method.is_virtual && object.ty.is_reference();
        }
        self.emit_all(args, flags)?;
        self.emit_call(method, is_virtual)?;
        self.pop_if(flags.is_discarded() && !method.ret.is_void());
        Ok(())
    }

    pub(super) fn emit_new(&mut self, new: &NewExpr, flags: EmitFlags) -> PassResult {
        self.emit_all(&new.args, flags)?;
        match &new.constructor {
            Some(constructor) => self.emit_call(constructor, false)?,
            None => {
                let index = self.struct_index(&new.def)?;
                self.emit(Instruction::NewStruct(index, new.args.len() as u16));
            }
        }
        Ok(())
    }

    pub(super) fn emit_member_init(
        &mut self,
        new: &NewExpr,
        bindings: &[MemberBinding],
        flags: EmitFlags,
    ) -> PassResult {
        self.emit_new(new, flags)?;
        match new.def.kind {
            StructKind::Class => {
                // The instance stays on the stack; every binding works on a
                // copy of the reference.
                for MemberBinding::Assign(member, value) in bindings {
                    self.emit(Instruction::Dup);
                    self.emit_member_store(member, value, flags)?;
                }
                self.pop_if(flags.is_discarded());
            }
            StructKind::Value => {
                let instance = self.alloc_slot()?;
                self.emit(Instruction::StoreLocal(instance));
                for MemberBinding::Assign(member, value) in bindings {
                    self.emit(Instruction::LoadLocalAddress(instance));
                    self.emit_member_store(member, value, flags)?;
                }
                if !flags.is_discarded() {
                    self.emit(Instruction::LoadLocal(instance));
                }
            }
        }
        Ok(())
    }

    /// With the receiver on the stack, emits `value` and stores it into
    /// `member`, consuming both.
    fn emit_member_store(&mut self, member: &Member, value: &Expr, flags: EmitFlags) -> PassResult {
        match member {
            Member::Field { index, .. } => {
                self.emit_expr(value, flags.child())?;
                self.emit(Instruction::StoreField(*index as u32));
            }
            Member::Property { setter, .. } => {
                let setter = setter.as_ref().ok_or(Unsupported::CompoundAssignTarget {
                    kind: "read-only property",
                })?;
                self.emit_expr(value, flags.child())?;
                self.emit_call(setter, false)?;
                self.pop_if(!setter.ret.is_void());
            }
        }
        Ok(())
    }

    pub(super) fn emit_member_access(
        &mut self,
        object: &Expr,
        member: &Member,
        flags: EmitFlags,
    ) -> PassResult {
        match member {
            Member::Field { index, .. } => {
                self.emit_expr(object, flags.child() | EmitFlags::MEMBER_RECEIVER)?;
                self.emit(Instruction::LoadField(*index as u32));
            }
            Member::Property { getter, .. } if getter.is_static => {
                self.emit_expr(object, flags.discarded())?;
                self.emit_call(getter, false)?;
            }
            Member::Property { getter, .. } => {
                self.emit_expr(object, Self::receiver_flags(getter, &object.ty, flags))?;
                self.emit_call(getter, false)?;
            }
        }
        self.pop_if(flags.is_discarded());
        Ok(())
    }

    pub(super) fn emit_member_assign(
        &mut self,
        object: &Expr,
        member: &Member,
        value: &Expr,
        flags: EmitFlags,
    ) -> PassResult {
        self.emit_expr(object, flags.child() | EmitFlags::MEMBER_RECEIVER)?;
        if flags.is_discarded() {
            return self.emit_member_store(member, value, flags);
        }
        let result = self.alloc_slot()?;
        match member {
            Member::Field { index, .. } => {
                self.emit_expr(value, flags.child())?;
                self.emit(Instruction::Dup);
                self.emit(Instruction::StoreLocal(result));
                self.emit(Instruction::StoreField(*index as u32));
            }
            Member::Property { setter, .. } => {
                let setter = setter.as_ref().ok_or(Unsupported::CompoundAssignTarget {
                    kind: "read-only property",
                })?;
                self.emit_expr(value, flags.child())?;
                self.emit(Instruction::Dup);
                self.emit(Instruction::StoreLocal(result));
                self.emit_call(setter, false)?;
                self.pop_if(!setter.ret.is_void());
            }
        }
        self.emit(Instruction::LoadLocal(result));
        Ok(())
    }

    pub(super) fn emit_index(
        &mut self,
        object: &Expr,
        indexer: Option<&Rc<Indexer>>,
        args: &[ExprRef],
        flags: EmitFlags,
    ) -> PassResult {
        match indexer {
            None => {
                self.emit_expr(object, flags.child())?;
                self.emit_all(args, flags)?;
                self.emit(Instruction::LoadElement);
            }
            Some(indexer) => {
                self.emit_expr(object, Self::receiver_flags(&indexer.getter, &object.ty, flags))?;
                self.emit_all(args, flags)?;
                self.emit_call(&indexer.getter, false)?;
            }
        }
        self.pop_if(flags.is_discarded());
        Ok(())
    }

    pub(super) fn emit_index_assign(
        &mut self,
        object: &Expr,
        indexer: Option<&Rc<Indexer>>,
        args: &[ExprRef],
        value: &Expr,
        flags: EmitFlags,
    ) -> PassResult {
        let setter = match indexer {
            None => None,
            Some(indexer) => Some(indexer.setter.clone().ok_or(
                Unsupported::CompoundAssignTarget {
                    kind: "read-only indexer",
                },
            )?),
        };
        let receiver = match &setter {
            Some(setter) => Self::receiver_flags(setter, &object.ty, flags),
            None => flags.child(),
        };
        self.emit_expr(object, receiver)?;
        self.emit_all(args, flags)?;
        self.emit_expr(value, flags.child())?;

        let result = match flags.is_discarded() {
            true => None,
            false => {
                let slot = self.alloc_slot()?;
                self.emit(Instruction::Dup);
                self.emit(Instruction::StoreLocal(slot));
                Some(slot)
            }
        };
        match setter {
            None => self.emit(Instruction::StoreElement),
            Some(setter) => {
                self.emit_call(&setter, false)?;
                self.pop_if(!setter.ret.is_void());
            }
        }
        if let Some(slot) = result {
            self.emit(Instruction::LoadLocal(slot));
        }
        Ok(())
    }

    pub(super) fn emit_new_array(
        &mut self,
        element: &Type,
        init: &ArrayInit,
        flags: EmitFlags,
    ) -> PassResult {
        match init {
            ArrayInit::Elements(items) => {
                self.emit_all(items, flags)?;
                self.emit(Instruction::NewArray(items.len() as u32));
            }
            ArrayInit::Bounds(length) => {
                self.emit_expr(length, flags.child())?;
                let default = self.literal(&Value::default_for(element))?;
                self.emit(Instruction::NewArrayBounds(default));
            }
        }
        self.pop_if(flags.is_discarded());
        Ok(())
    }

    pub(super) fn emit_invoke(
        &mut self,
        expr: &Expr,
        target: &Expr,
        args: &[ExprRef],
        flags: EmitFlags,
    ) -> PassResult {
        self.emit_expr(target, flags.child())?;
        self.emit_all(args, flags)?;
        self.emit(Instruction::Invoke(args.len() as u32));
        // Invoke always pushes a result; void calls push unit.
        self.pop_if(flags.is_discarded() || expr.ty.is_void());
        Ok(())
    }
}
