//! Second pass: bytecode emission.
//!
//! The emitter walks a lambda body with the unit's closure plan in hand and
//! appends instructions to a [`Code`] under construction. It tracks the
//! operand stack depth of every instruction (the VM sizes its stack from the
//! maximum) and hands a small set of [`EmitFlags`] down the tree describing
//! how the parent consumes each child.
//!
//! Node kinds are split across submodules:
//!
//! - `arith`: unary and binary operators, conversions and assignments;
//! - `control`: conditionals, blocks, loops, labels, jumps and switches;
//! - `protected`: try/catch/finally/fault regions;
//! - `members`: calls, construction, fields, properties, indexers, arrays;
//! - `lambda`: references to nested units.
//!
//! Nested units themselves are compiled by [`super::nested`] before the
//! unit that creates them.

mod arith;
mod control;
mod lambda;
mod members;
mod protected;

use alloc::rc::Rc;

use bitflags::bitflags;
use hashbrown::HashMap;
use smallvec::SmallVec;

use super::closure_info::{ArenaMap, ClosureInfo, ClosureStatus, Session};
use super::error::{CompileError, PassResult, Unsupported};
use super::pool;
use crate::{
    String, ToString, Vec,
    ast::{Expr, ExprKind, LabelKey, LabelTarget, LambdaExpr, ParamKey, ParameterExpr},
    types::{MethodDef, StructDef, Type},
    values::Value,
    vm::{Code, Handler, Instruction},
};

const MAX_LOCALS: u32 = u16::MAX as u32;
const MAX_TABLE_ENTRIES: u32 = u32::MAX >> 1;

bitflags! {
    /// How a parent consumes the value of the node being emitted. Flags only
    /// travel down the tree.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct EmitFlags: u8 {
        /// The parent ignores the value; only side effects are emitted.
        const RESULT_DISCARDED = 1 << 0;
        /// The value is the receiver of a method call.
        const CALL_RECEIVER = 1 << 1;
        /// The value is the receiver of a field or property access.
        const MEMBER_RECEIVER = 1 << 2;
        /// The value is an operand the parent has already checked for null.
        const ARITHMETIC_OPERAND = 1 << 3;
        /// The node is inside a protected region; jumps leave through `Leave`.
        const IN_TRY = 1 << 4;
    }
}

impl EmitFlags {
    /// Flags inherited by a child whose value the parent consumes itself.
    fn child(self) -> EmitFlags {
        self & EmitFlags::IN_TRY
    }

    fn discarded(self) -> EmitFlags {
        self.child() | EmitFlags::RESULT_DISCARDED
    }

    fn is_discarded(self) -> bool {
        self.contains(EmitFlags::RESULT_DISCARDED)
    }

    fn wants_address(self) -> bool {
        self.intersects(EmitFlags::CALL_RECEIVER | EmitFlags::MEMBER_RECEIVER)
    }
}

/// Index into the emitter's label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LabelId(usize);

#[derive(Debug)]
struct EmitLabel {
    /// User label name, for diagnostics; internal labels have none.
    name: Option<String>,
    position: Option<u32>,
    /// Jumps waiting for the position: instruction index and the finally
    /// block the jump sits in.
    fixups: Vec<(usize, Option<u32>)>,
    /// Operand stack depth on arrival.
    depth: Option<u32>,
    /// Slot carrying the value of a valued user label.
    value_slot: Option<u32>,
    /// Finally block the label is placed in.
    finally: Option<Option<u32>>,
}

impl EmitLabel {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| "<internal>".to_string())
    }
}

/// Where a variable lives, from the point of view of the unit being emitted.
#[derive(Debug, Clone, Copy)]
enum VarRef {
    Local(u32),
    /// A local slot holding a shared cell.
    Boxed(u32),
    /// A cell of the closure record.
    Captured(u32),
}

pub(crate) struct Emitter<'e, 's> {
    session: &'e Session<'s>,
    info: &'e mut ClosureInfo<'s>,
    lambda: &'e LambdaExpr,
    /// Closure record supplied by the caller instead of a collected one.
    supplied: Option<&'e [Value]>,

    instructions: Vec<Instruction>,
    literals: Vec<Value>,
    types: Vec<Type>,
    methods: Vec<Rc<MethodDef>>,
    structs: Vec<Rc<StructDef>>,
    handlers: Vec<Handler>,

    slots: ArenaMap<'s, ParamKey, u32>,
    num_locals: u32,

    labels: Vec<EmitLabel>,
    depth: u32,
    max_depth: u32,
    /// Cleared after an unconditional transfer, set again by a label.
    reachable: bool,

    /// Exception slots of the catch blocks being emitted, innermost last.
    catch_slots: Vec<u32>,
    /// Finally and fault blocks being emitted, innermost last.
    finally_stack: Vec<u32>,
    next_finally: u32,
}

impl<'e, 's> Emitter<'e, 's> {
    pub fn new(
        session: &'e Session<'s>,
        info: &'e mut ClosureInfo<'s>,
        lambda: &'e LambdaExpr,
        supplied: Option<&'e [Value]>,
    ) -> Self {
        debug_assert!(
            !info.status.contains(ClosureStatus::NEEDS_COLLECTION),
            "closure plan consumed before collection finished"
        );
        Self {
            session,
            info,
            lambda,
            supplied,
            instructions: Vec::new(),
            literals: Vec::new(),
            types: Vec::new(),
            methods: Vec::new(),
            structs: Vec::new(),
            handlers: Vec::new(),
            slots: HashMap::new_in(session.arena),
            num_locals: 0,
            labels: Vec::new(),
            depth: 0,
            max_depth: 0,
            reachable: true,
            catch_slots: Vec::new(),
            finally_stack: Vec::new(),
            next_finally: 0,
        }
    }

    /// Emits the whole unit and returns its code.
    pub fn compile(mut self) -> PassResult<Code> {
        let lambda = self.lambda;
        for param in &lambda.params {
            let slot = self.alloc_slot()?;
            self.slots.insert(ParamKey::of(param), slot);
        }
        self.emit_prologue()?;

        if lambda.signature.ret.is_void() {
            self.emit_expr(&lambda.body, EmitFlags::RESULT_DISCARDED)?;
            self.emit(Instruction::ConstUnit);
        } else {
            self.emit_expr(&lambda.body, EmitFlags::empty())?;
        }
        self.emit(Instruction::Return);
        self.finish()
    }

    // === Prologue ===

    fn emit_prologue(&mut self) -> PassResult {
        // Boxed parameters move into cells before anything can capture them.
        for (i, param) in self.lambda.params.iter().enumerate() {
            if self.info.is_boxed(ParamKey::of(param)) {
                self.emit(Instruction::LoadLocal(i as u32));
                self.emit(Instruction::NewCell(i as u32));
            }
        }
        if self.info.is_user_supplied() {
            return Ok(());
        }
        for index in 0..self.info.constants.len() {
            if self.info.constants[index].usage > 1 {
                let slot = self.alloc_slot()?;
                self.emit(Instruction::LoadConstant(index as u32));
                self.emit(Instruction::StoreLocal(slot));
                self.info.constants[index].hoisted_slot = Some(slot);
            }
        }
        let base = self.info.constants.len();
        for index in 0..self.info.nested.len() {
            if self.info.nested[index].usage > 1 {
                let slot = self.alloc_slot()?;
                self.emit(Instruction::LoadConstant((base + index) as u32));
                self.emit(Instruction::StoreLocal(slot));
                self.info.nested[index].hoisted_slot = Some(slot);
            }
        }
        Ok(())
    }

    fn finish(self) -> PassResult<Code> {
        for label in &self.labels {
            if label.position.is_none() && !label.fixups.is_empty() {
                return Err(CompileError::LabelNotPlaced {
                    label: label.display_name(),
                }
                .into());
            }
        }
        let has_record = match self.supplied {
            Some(values) => !values.is_empty(),
            None => self.info.record_len() > 0 || !self.info.non_passed.is_empty(),
        };
        Ok(Code {
            name: self.lambda.name.clone(),
            signature: self.lambda.signature.clone(),
            shapes: pool::signature_shapes(&self.lambda.signature, has_record),
            literals: self.literals,
            types: self.types,
            methods: self.methods,
            structs: self.structs,
            instructions: self.instructions,
            handlers: self.handlers,
            num_params: self.lambda.params.len(),
            num_locals: self.num_locals as usize,
            max_stack_size: self.max_depth as usize,
        })
    }

    // === Instruction Emission ===

    fn position(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Appends an instruction and applies its stack effect.
    fn emit(&mut self, instruction: Instruction) {
        let (pops, pushes) = self.stack_effect(&instruction);
        debug_assert!(
            !self.reachable || self.depth >= pops,
            "Stack underflow emitting {:?} at depth {}",
            instruction,
            self.depth
        );
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        if matches!(
            instruction,
            Instruction::Jump(_)
                | Instruction::Leave(_)
                | Instruction::Throw
                | Instruction::Return
                | Instruction::EndFinally
        ) {
            self.reachable = false;
        }
        self.instructions.push(instruction);
    }

    fn stack_effect(&self, instruction: &Instruction) -> (u32, u32) {
        use Instruction::*;
        match *instruction {
            Halt | Nop | Jump(_) | Leave(_) | EndFinally => (0, 0),
            ConstNull | ConstUnit | ConstBool(_) | ConstI32(_) | ConstLiteral(_)
            | LoadConstant(_) | LoadLocal(_) | LoadLocalAddress(_) | LoadCell(_)
            | LoadCellAddress(_) | LoadCaptured(_) | LoadCapturedCell(_)
            | LoadCapturedAddress(_) => (0, 1),
            Dup => (1, 2),
            Pop | StoreLocal(_) | NewCell(_) | StoreCell(_) | StoreCaptured(_) => (1, 0),
            JumpIfFalse(_) | JumpIfTrue(_) | JumpIfNull(_) | JumpIfNotNull(_) => (1, 0),
            Throw | Return => (1, 0),
            Arith(..) | Logical(_) | Compare(..) | Eq | NotEq | Concat => (2, 1),
            Negate(_) | Not | Convert(_) | UnwrapNullable | CastClass(_) => (1, 1),
            Call(index) | CallVirtual(index) => {
                let method = &self.methods[index as usize];
                let receiver = u32::from(!method.is_static);
                let result = u32::from(!method.ret.is_void());
                (method.arity() as u32 + receiver, result)
            }
            Invoke(argc) => (argc + 1, 1),
            Curry(count) => (count + 1, 1),
            NewStruct(_, argc) => (u32::from(argc), 1),
            LoadField(_) => (1, 1),
            StoreField(_) => (2, 0),
            NewArray(count) => (count, 1),
            NewArrayBounds(_) => (1, 1),
            LoadElement => (2, 1),
            StoreElement => (3, 0),
            ArrayLength => (1, 1),
        }
    }

    /// Accounts for the value a non-void node would have produced when control
    /// never falls out of it (a throw or a jump in a value position).
    fn push_phantom(&mut self) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    /// Starts emitting a handler block entered with `depth` values on the
    /// operand stack.
    fn enter_handler(&mut self, depth: u32) {
        self.depth = depth;
        self.reachable = true;
    }

    fn pop_if(&mut self, discard: bool) {
        if discard {
            self.emit(Instruction::Pop);
        }
    }

    // === Tables ===

    fn table_index(len: usize) -> PassResult<u32> {
        let index = len as u32;
        if index >= MAX_TABLE_ENTRIES {
            return Err(CompileError::TooManyConstants {
                limit: MAX_TABLE_ENTRIES,
            }
            .into());
        }
        Ok(index)
    }

    fn literal(&mut self, value: &Value) -> PassResult<u32> {
        if let Some(index) = self.literals.iter().position(|v| v.same_literal(value)) {
            return Ok(index as u32);
        }
        let index = Self::table_index(self.literals.len())?;
        self.literals.push(value.clone());
        Ok(index)
    }

    fn type_index(&mut self, ty: &Type) -> PassResult<u32> {
        if let Some(index) = self.types.iter().position(|t| t == ty) {
            return Ok(index as u32);
        }
        let index = Self::table_index(self.types.len())?;
        self.types.push(ty.clone());
        Ok(index)
    }

    fn method_index(&mut self, method: &Rc<MethodDef>) -> PassResult<u32> {
        if let Some(index) = self.methods.iter().position(|m| Rc::ptr_eq(m, method)) {
            return Ok(index as u32);
        }
        let index = Self::table_index(self.methods.len())?;
        self.methods.push(method.clone());
        Ok(index)
    }

    fn struct_index(&mut self, def: &Rc<StructDef>) -> PassResult<u16> {
        if let Some(index) = self.structs.iter().position(|d| Rc::ptr_eq(d, def)) {
            return Ok(index as u16);
        }
        let index = self.structs.len();
        if index >= u16::MAX as usize {
            return Err(CompileError::TooManyConstants {
                limit: u16::MAX as u32,
            }
            .into());
        }
        self.structs.push(def.clone());
        Ok(index as u16)
    }

    fn emit_call(&mut self, method: &Rc<MethodDef>, is_virtual: bool) -> PassResult {
        let index = self.method_index(method)?;
        self.emit(if is_virtual {
            Instruction::CallVirtual(index)
        } else {
            Instruction::Call(index)
        });
        Ok(())
    }

    // === Local Variable Management ===

    fn alloc_slot(&mut self) -> PassResult<u32> {
        if self.num_locals >= MAX_LOCALS {
            return Err(CompileError::TooManyLocals { limit: MAX_LOCALS }.into());
        }
        let slot = self.num_locals;
        self.num_locals += 1;
        Ok(slot)
    }

    fn resolve(&self, param: &Rc<ParameterExpr>) -> PassResult<VarRef> {
        let key = ParamKey::of(param);
        if let Some(&slot) = self.slots.get(&key) {
            return Ok(if self.info.is_boxed(key) {
                VarRef::Boxed(slot)
            } else {
                VarRef::Local(slot)
            });
        }
        if let Some(index) = self.info.captured_index(key) {
            return Ok(VarRef::Captured(index as u32));
        }
        Err(CompileError::UndefinedVariable {
            name: param.name.clone(),
        }
        .into())
    }

    /// Brings a block or catch variable into scope in a fresh slot. Returns
    /// the slot and the binding it shadows.
    fn declare(&mut self, var: &Rc<ParameterExpr>) -> PassResult<(u32, Option<u32>)> {
        let slot = self.alloc_slot()?;
        let shadowed = self.slots.insert(ParamKey::of(var), slot);
        Ok((slot, shadowed))
    }

    fn undeclare(&mut self, var: &Rc<ParameterExpr>, shadowed: Option<u32>) {
        let key = ParamKey::of(var);
        match shadowed {
            Some(slot) => {
                self.slots.insert(key, slot);
            }
            None => {
                self.slots.remove(&key);
            }
        }
    }

    /// Stores the value on top of the stack into a freshly declared variable,
    /// creating its cell when it is captured.
    fn init_var(&mut self, var: &Rc<ParameterExpr>, slot: u32) {
        if self.info.is_boxed(ParamKey::of(var)) {
            self.emit(Instruction::NewCell(slot));
        } else {
            self.emit(Instruction::StoreLocal(slot));
        }
    }

    fn load_var(&mut self, var: VarRef, address: bool) {
        self.emit(match (var, address) {
            (VarRef::Local(slot), false) => Instruction::LoadLocal(slot),
            (VarRef::Local(slot), true) => Instruction::LoadLocalAddress(slot),
            (VarRef::Boxed(slot), false) => Instruction::LoadCell(slot),
            (VarRef::Boxed(slot), true) => Instruction::LoadCellAddress(slot),
            (VarRef::Captured(index), false) => Instruction::LoadCaptured(index),
            (VarRef::Captured(index), true) => Instruction::LoadCapturedAddress(index),
        });
    }

    fn store_var(&mut self, var: VarRef) {
        self.emit(match var {
            VarRef::Local(slot) => Instruction::StoreLocal(slot),
            VarRef::Boxed(slot) => Instruction::StoreCell(slot),
            VarRef::Captured(index) => Instruction::StoreCaptured(index),
        });
    }

    // === Labels ===

    fn new_label(&mut self) -> LabelId {
        self.labels.push(EmitLabel {
            name: None,
            position: None,
            fixups: Vec::new(),
            depth: None,
            value_slot: None,
            finally: None,
        });
        LabelId(self.labels.len() - 1)
    }

    /// The emitter label of a user label target, created on first use.
    fn user_label(&mut self, target: &Rc<LabelTarget>) -> PassResult<LabelId> {
        if self.info.is_user_supplied() {
            return Err(CompileError::LabelsWithSuppliedClosure.into());
        }
        let key = LabelKey::of(target);
        let existing = match self.info.labels.get(&key) {
            Some(label) => label.bytecode,
            None => {
                return Err(CompileError::LabelNotRegistered {
                    label: target.display_name().to_string(),
                }
                .into());
            }
        };
        if let Some(index) = existing {
            return Ok(LabelId(index));
        }
        let value_slot = match target.ty.is_void() {
            true => None,
            false => Some(self.alloc_slot()?),
        };
        let id = self.new_label();
        let label = &mut self.labels[id.0];
        label.name = Some(target.display_name().to_string());
        label.value_slot = value_slot;
        if let Some(info) = self.info.labels.get_mut(&key) {
            info.bytecode = Some(id.0);
        }
        Ok(id)
    }

    fn label_value_slot(&self, id: LabelId) -> Option<u32> {
        self.labels[id.0].value_slot
    }

    fn unbalanced(&self, id: LabelId) -> Unsupported {
        Unsupported::UnbalancedJump {
            label: self.labels[id.0].display_name(),
        }
    }

    fn check_depth(&mut self, id: LabelId) -> PassResult {
        match self.labels[id.0].depth {
            Some(expected) if expected != self.depth => Err(self.unbalanced(id).into()),
            Some(_) => Ok(()),
            None => {
                self.labels[id.0].depth = Some(self.depth);
                Ok(())
            }
        }
    }

    fn current_finally(&self) -> Option<u32> {
        self.finally_stack.last().copied()
    }

    /// Emits a jump (or `Leave`) to `id`, patched once the label is placed.
    fn jump(&mut self, instruction: Instruction, id: LabelId) -> PassResult {
        let finally = self.current_finally();
        let at = self.instructions.len();
        let placed = self.labels[id.0].position;
        if placed.is_some() && self.labels[id.0].finally != Some(finally) {
            return Err(Unsupported::JumpOutOfFinally {
                label: self.labels[id.0].display_name(),
            }
            .into());
        }
        self.emit(instruction.with_jump_target(placed.unwrap_or(0)));
        self.check_depth(id)?;
        if placed.is_none() {
            self.labels[id.0].fixups.push((at, finally));
        }
        Ok(())
    }

    /// Places `id` at the current position. A label that is already placed
    /// stays where it is.
    fn place(&mut self, id: LabelId) -> PassResult {
        if self.labels[id.0].position.is_some() {
            return Ok(());
        }
        if self.reachable {
            self.check_depth(id)?;
        } else {
            match self.labels[id.0].depth {
                Some(depth) => self.depth = depth,
                None => self.labels[id.0].depth = Some(self.depth),
            }
        }
        self.reachable = true;

        let position = self.position();
        let finally = self.current_finally();
        let fixups = core::mem::take(&mut self.labels[id.0].fixups);
        for &(at, jump_finally) in &fixups {
            if jump_finally != finally {
                return Err(Unsupported::JumpOutOfFinally {
                    label: self.labels[id.0].display_name(),
                }
                .into());
            }
            self.instructions[at] = self.instructions[at].with_jump_target(position);
        }
        let label = &mut self.labels[id.0];
        label.position = Some(position);
        label.finally = Some(finally);
        Ok(())
    }

    // === Expressions ===

    pub(crate) fn emit_expr(&mut self, expr: &Expr, flags: EmitFlags) -> PassResult {
        match &expr.kind {
            ExprKind::Constant(value) => self.emit_constant(value, flags),
            ExprKind::Parameter(param) => self.emit_parameter(param, flags),
            ExprKind::Default => {
                if !flags.is_discarded() && !expr.ty.is_void() {
                    self.emit_value(&Value::default_for(&expr.ty))?;
                }
                Ok(())
            }
            ExprKind::Unary {
                op,
                operand,
                method,
            } => self.emit_unary(expr, *op, operand.as_ref(), method.as_ref(), flags),
            ExprKind::Binary {
                op,
                left,
                right,
                method,
            } => self.emit_binary(expr, *op, left, right, method.as_ref(), flags),
            ExprKind::Call {
                object,
                method,
                args,
            } => self.emit_method_call(object.as_ref(), method, args, flags),
            ExprKind::New(new) => {
                self.emit_new(new, flags)?;
                self.pop_if(flags.is_discarded());
                Ok(())
            }
            ExprKind::MemberAccess { object, member } => {
                self.emit_member_access(object, member, flags)
            }
            ExprKind::Index {
                object,
                indexer,
                args,
            } => self.emit_index(object, indexer.as_ref(), args, flags),
            ExprKind::NewArray { element, init } => self.emit_new_array(element, init, flags),
            ExprKind::MemberInit { new, bindings } => self.emit_member_init(new, bindings, flags),
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => self.emit_conditional(expr, test, if_true, if_false, flags),
            ExprKind::Block { variables, exprs } => {
                self.emit_block(expr, variables, exprs, flags)
            }
            ExprKind::Loop {
                body,
                break_label,
                continue_label,
            } => self.emit_loop(
                expr,
                body,
                break_label.as_ref(),
                continue_label.as_ref(),
                flags,
            ),
            ExprKind::Try(node) => self.emit_try(expr, node, flags),
            ExprKind::Label { target, default } => {
                self.emit_label(expr, target, default.as_ref(), flags)
            }
            ExprKind::Goto { target, value, .. } => {
                self.emit_goto(expr, target, value.as_ref(), flags)
            }
            ExprKind::Switch(node) => self.emit_switch(expr, node, flags),
            ExprKind::Lambda(lambda) => self.emit_lambda(lambda, flags),
            ExprKind::Invoke { target, args } => self.emit_invoke(expr, target, args, flags),
        }
    }

    fn emit_constant(&mut self, value: &Value, flags: EmitFlags) -> PassResult {
        if flags.is_discarded() {
            return Ok(());
        }
        if value.identity().is_none() {
            return self.emit_value(value);
        }
        if let Some(values) = self.supplied {
            let identity = value.identity();
            let index = values
                .iter()
                .position(|v| v.identity() == identity)
                .ok_or(Unsupported::MissingSuppliedConstant)?;
            self.emit(Instruction::LoadConstant(index as u32));
            return Ok(());
        }
        let Some(index) = self.info.constant_index(value) else {
            debug_assert!(false, "constant {:?} was not collected", value);
            let index = self.literal(value)?;
            self.emit(Instruction::ConstLiteral(index));
            return Ok(());
        };
        match self.info.constants[index].hoisted_slot {
            Some(slot) => self.emit(Instruction::LoadLocal(slot)),
            None => self.emit(Instruction::LoadConstant(index as u32)),
        }
        Ok(())
    }

    /// Pushes a value without identity: an immediate or a literal-table entry.
    fn emit_value(&mut self, value: &Value) -> PassResult {
        match value {
            Value::Unit => self.emit(Instruction::ConstUnit),
            Value::Null => self.emit(Instruction::ConstNull),
            Value::Bool(b) => self.emit(Instruction::ConstBool(*b)),
            Value::I32(n) => self.emit(Instruction::ConstI32(*n)),
            other => {
                let index = self.literal(other)?;
                self.emit(Instruction::ConstLiteral(index));
            }
        }
        Ok(())
    }

    fn emit_parameter(&mut self, param: &Rc<ParameterExpr>, flags: EmitFlags) -> PassResult {
        let var = self.resolve(param)?;
        if flags.is_discarded() {
            return Ok(());
        }
        let address = flags.wants_address() && param.ty.is_value_struct();
        self.load_var(var, address);
        Ok(())
    }

    /// Emits `exprs` left to right, each leaving its value on the stack.
    fn emit_all(&mut self, exprs: &[crate::ast::ExprRef], flags: EmitFlags) -> PassResult {
        let flags = flags.child();
        exprs.iter().try_for_each(|expr| self.emit_expr(expr, flags))
    }

    /// Variables captured by an open nested unit, resolved in this unit.
    fn capture_cells(&self, captures: &[Rc<ParameterExpr>]) -> PassResult<SmallVec<[Instruction; 4]>> {
        captures
            .iter()
            .map(|param| match self.resolve(param)? {
                VarRef::Boxed(slot) => Ok(Instruction::LoadLocal(slot)),
                VarRef::Captured(index) => Ok(Instruction::LoadCapturedCell(index)),
                VarRef::Local(_) => Err(CompileError::UnboxedCapture {
                    name: param.name.clone(),
                }
                .into()),
            })
            .collect()
    }
}
