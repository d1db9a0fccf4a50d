use alloc::rc::Rc;
use core::cell::RefCell;

use smallvec::SmallVec;

use super::instruction_set::Instruction;

use crate::{
    Vec, format,
    evaluator::{ExecutionError, operators},
    types::MethodDef,
    values::{Address, Exception, ExceptionKind, SharedCell, Value},
    vm::{ClosureRecord, Code, HandlerKind, Stack},
};

type Args = SmallVec<[Value; 4]>;

/// What happens when a finally or fault block reaches `EndFinally`.
#[derive(Debug)]
enum Resume {
    /// Continue a `Leave` towards this target.
    Leave(u32),
    /// Keep unwinding with this exception.
    Rethrow(ExecutionError),
}

#[derive(Debug)]
struct PendingFinally {
    /// Index into the handler table.
    handler: usize,
    resume: Resume,
}

pub struct VM<'a> {
    code: &'a Code,
    record: &'a ClosureRecord,
    ip: usize,
    stack: Stack<Value>,
    locals: Vec<Value>,
    pending: Vec<PendingFinally>,
}

impl<'a> VM<'a> {
    pub fn new(code: &'a Code, record: &'a ClosureRecord, args: &[Value]) -> Self {
        let mut locals = Vec::with_capacity(code.num_locals.max(args.len()));
        locals.extend_from_slice(args);
        locals.resize(code.num_locals.max(args.len()), Value::Unit);
        VM {
            code,
            record,
            ip: 0,
            stack: Stack::new(code.max_stack_size),
            locals,
            pending: Vec::new(),
        }
    }

    /// Runs the unit to completion, dispatching exceptions through the
    /// handler table.
    pub fn run(&mut self) -> Result<Value, ExecutionError> {
        loop {
            match self.execute() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let pc = self.ip.saturating_sub(1);
                    self.unwind(error, pc)?;
                }
            }
        }
    }

    fn execute(&mut self) -> Result<Value, ExecutionError> {
        loop {
            let instruction = *self.code.instructions.get(self.ip).ok_or_else(|| {
                ExecutionError::internal(format!("instruction pointer {} out of range", self.ip))
            })?;
            self.ip += 1;

            use Instruction::*;
            match instruction {
                Halt => return Err(ExecutionError::internal("reached Halt")),
                Nop => {}

                ConstNull => self.stack.push(Value::Null),
                ConstUnit => self.stack.push(Value::Unit),
                ConstBool(b) => self.stack.push(Value::Bool(b)),
                ConstI32(n) => self.stack.push(Value::I32(n)),
                ConstLiteral(index) => {
                    let value = self.code.literals[index as usize].clone();
                    self.stack.push(value);
                }
                LoadConstant(index) => {
                    let value = self.constant(index)?.clone();
                    self.stack.push(value);
                }
                Pop => {
                    self.pop()?;
                }
                Dup => {
                    let top = self.peek()?.clone();
                    self.stack.push(top);
                }

                LoadLocal(slot) => {
                    let value = self.locals[slot as usize].clone();
                    self.stack.push(value);
                }
                StoreLocal(slot) => {
                    self.locals[slot as usize] = self.pop()?;
                }
                LoadLocalAddress(slot) => {
                    self.stack.push(Value::Address(Address::Local(slot)));
                }
                NewCell(slot) => {
                    let value = self.pop()?;
                    self.locals[slot as usize] = Value::Cell(Rc::new(RefCell::new(value)));
                }
                LoadCell(slot) => {
                    let value = self.local_cell(slot)?.borrow().clone();
                    self.stack.push(value);
                }
                StoreCell(slot) => {
                    let value = self.pop()?;
                    *self.local_cell(slot)?.borrow_mut() = value;
                }
                LoadCellAddress(slot) => {
                    let cell = self.local_cell(slot)?.clone();
                    self.stack.push(Value::Address(Address::Cell(cell)));
                }
                LoadCaptured(index) => {
                    let value = self.captured(index)?.borrow().clone();
                    self.stack.push(value);
                }
                StoreCaptured(index) => {
                    let value = self.pop()?;
                    *self.captured(index)?.borrow_mut() = value;
                }
                LoadCapturedCell(index) => {
                    let cell = self.captured(index)?.clone();
                    self.stack.push(Value::Cell(cell));
                }
                LoadCapturedAddress(index) => {
                    let cell = self.captured(index)?.clone();
                    self.stack.push(Value::Address(Address::Cell(cell)));
                }

                Arith(op, _) | Logical(op) => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack.push(operators::arith(op, &left, &right)?);
                }
                Compare(op, _) => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack
                        .push(Value::Bool(operators::compare(op, &left, &right)?));
                }
                Negate(_) => {
                    let value = self.pop()?;
                    self.stack.push(operators::negate(&value)?);
                }
                Not => {
                    let value = self.pop()?;
                    self.stack.push(operators::not(&value)?);
                }
                Convert(kind) => {
                    let value = self.pop()?;
                    self.stack.push(operators::convert(&value, kind)?);
                }
                Eq | NotEq => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let equal = left.equals(&right);
                    self.stack.push(Value::Bool(equal == (instruction == Eq)));
                }
                Concat => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack.push(operators::concat(&left, &right)?);
                }
                UnwrapNullable => {
                    if self.peek()?.is_null() {
                        return Err(Exception::no_value().into());
                    }
                }
                CastClass(index) => {
                    let ty = &self.code.types[index as usize];
                    let value = self.peek()?;
                    if !value.is_null() && !value.is_instance_of(ty) {
                        return Err(Exception::new(
                            ExceptionKind::InvalidCast,
                            format!("Unable to cast {:?} to {}.", value, ty),
                        )
                        .into());
                    }
                }

                Jump(target) => self.ip = target as usize,
                JumpIfFalse(target) => {
                    if !self.pop_bool()? {
                        self.ip = target as usize;
                    }
                }
                JumpIfTrue(target) => {
                    if self.pop_bool()? {
                        self.ip = target as usize;
                    }
                }
                JumpIfNull(target) => {
                    if self.pop()?.is_null() {
                        self.ip = target as usize;
                    }
                }
                JumpIfNotNull(target) => {
                    if !self.pop()?.is_null() {
                        self.ip = target as usize;
                    }
                }
                Leave(target) => self.leave(self.ip - 1, target),
                EndFinally => {
                    let pc = self.ip - 1;
                    let frame = self.pending.pop().ok_or_else(|| {
                        ExecutionError::internal(format!("EndFinally at {} without pending block", pc))
                    })?;
                    match frame.resume {
                        Resume::Leave(target) => self.leave(pc, target),
                        Resume::Rethrow(error) => return Err(error),
                    }
                }
                Throw => {
                    let value = self.pop()?;
                    if value.is_null() {
                        return Err(Exception::null_reference().into());
                    }
                    return Err(ExecutionError::Thrown(value));
                }
                Return => return self.pop(),

                Call(index) => {
                    let method = self.code.methods[index as usize].clone();
                    self.call_method(&method, false)?;
                }
                CallVirtual(index) => {
                    let method = self.code.methods[index as usize].clone();
                    self.call_method(&method, true)?;
                }
                Invoke(argc) => {
                    let args = self.pop_args(argc as usize)?;
                    let callee = self.pop()?;
                    let result = match callee {
                        Value::Function(function) => function.call(&args)?,
                        Value::Null => return Err(Exception::null_reference().into()),
                        other => {
                            return Err(ExecutionError::internal(format!(
                                "invoke on {:?}",
                                other
                            )));
                        }
                    };
                    self.stack.push(result);
                }
                Curry(count) => {
                    let cells = self.pop_args(count as usize)?;
                    let unit = self.pop()?;
                    let Value::OpenUnit(unit) = unit else {
                        return Err(ExecutionError::internal(format!("curry on {:?}", unit)));
                    };
                    let cells = cells
                        .into_iter()
                        .map(|cell| match cell {
                            Value::Cell(cell) => Ok(cell),
                            other => Err(ExecutionError::internal(format!(
                                "curry expects cells, got {:?}",
                                other
                            ))),
                        })
                        .collect::<Result<Vec<SharedCell>, _>>()?;
                    self.stack.push(Value::Function(Rc::new(unit.bind(cells))));
                }

                NewStruct(index, argc) => {
                    let fields = self.pop_args(argc as usize)?;
                    let def = &self.code.structs[index as usize];
                    self.stack.push(Value::new_struct(def, fields.into_vec()));
                }
                LoadField(index) => {
                    let receiver = self.pop()?;
                    let value = self.deref(receiver)?.field(index as usize)?;
                    self.stack.push(value);
                }
                StoreField(index) => {
                    let value = self.pop()?;
                    let receiver = self.pop()?;
                    match receiver {
                        Value::Address(Address::Local(slot)) => {
                            self.locals[slot as usize].set_field(index as usize, value)?
                        }
                        Value::Address(Address::Cell(cell)) => {
                            cell.borrow_mut().set_field(index as usize, value)?
                        }
                        // Objects share their storage; a struct copy is
                        // updated and dropped.
                        mut other => other.set_field(index as usize, value)?,
                    }
                }
                NewArray(count) => {
                    let items = self.pop_args(count as usize)?;
                    self.stack.push(Value::array(items.into_vec()));
                }
                NewArrayBounds(index) => {
                    let length = self.pop()?;
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
                    let default = self.code.literals[index as usize].clone();
                    self.stack
                        .push(Value::array(alloc::vec![default; length as usize]));
                }
                LoadElement => {
                    let index = self.pop()?;
                    let array = self.pop()?;
                    let item = array.with_element(&index, |items, i| items[i].clone())?;
                    self.stack.push(item);
                }
                StoreElement => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let array = self.pop()?;
                    array.with_element(&index, |items, i| items[i] = value)?;
                }
                ArrayLength => {
                    let array = self.pop()?;
                    let length = match array {
                        Value::Array(items) => items.borrow().len(),
                        Value::Null => return Err(Exception::null_reference().into()),
                        other => {
                            return Err(ExecutionError::internal(format!(
                                "array length of {:?}",
                                other
                            )));
                        }
                    };
                    self.stack.push(Value::I32(length as i32));
                }
            }
        }
    }

    /// Transfers control to the handler for an exception raised at `pc`.
    /// Errors that are not exceptions, or that no handler takes, are
    /// returned.
    fn unwind(&mut self, error: ExecutionError, pc: usize) -> Result<(), ExecutionError> {
        let Some(exception) = error.thrown() else {
            return Err(error);
        };

        let found = self.code.handlers.iter().position(|handler| {
            handler.covers(pc)
                && match &handler.kind {
                    HandlerKind::Catch { test, .. } => exception.is_instance_of(test),
                    HandlerKind::Finally { .. } | HandlerKind::Fault { .. } => true,
                }
        });
        let Some(index) = found else {
            return Err(error);
        };
        let handler = &self.code.handlers[index];
        let target = handler.target() as usize;
        tracing::trace!(pc, target, "Exception dispatched to handler");

        // Pending blocks the exception escapes from are abandoned.
        let code = self.code;
        self.pending.retain(|frame| {
            let block = block_of(code, frame.handler);
            !(block.contains(&pc) && !block.contains(&target))
        });

        self.stack.truncate(handler.stack_depth as usize);
        match &handler.kind {
            HandlerKind::Catch { slot, .. } => {
                let exception = exception.clone();
                self.locals[*slot as usize] = exception;
            }
            HandlerKind::Finally { .. } | HandlerKind::Fault { .. } => {
                self.pending.push(PendingFinally {
                    handler: index,
                    resume: Resume::Rethrow(error),
                });
            }
        }
        self.ip = target;
        Ok(())
    }

    /// Leaves protected regions from `from` towards `target`, entering the
    /// innermost finally block crossed on the way.
    fn leave(&mut self, from: usize, target: u32) {
        let crossed = self.code.handlers.iter().position(|handler| {
            matches!(handler.kind, HandlerKind::Finally { .. })
                && handler.covers(from)
                && !handler.covers(target as usize)
        });
        match crossed {
            Some(index) => {
                let handler = &self.code.handlers[index];
                self.stack.truncate(handler.stack_depth as usize);
                self.ip = handler.target() as usize;
                self.pending.push(PendingFinally {
                    handler: index,
                    resume: Resume::Leave(target),
                });
            }
            None => self.ip = target as usize,
        }
    }

    fn call_method(&mut self, method: &Rc<MethodDef>, is_virtual: bool) -> Result<(), ExecutionError> {
        let args = self.pop_args(method.arity())?;
        let result = if method.is_static {
            (method.body)(None, &args)?
        } else {
            let receiver = self.pop()?;
            let method = if is_virtual {
                receiver
                    .struct_def()
                    .and_then(|def| def.find_method(&method.name))
                    .unwrap_or_else(|| method.clone())
            } else {
                method.clone()
            };
            match receiver {
                Value::Null => return Err(Exception::null_reference().into()),
                Value::Address(Address::Local(slot)) => {
                    (method.body)(Some(&mut self.locals[slot as usize]), &args)?
                }
                Value::Address(Address::Cell(cell)) => {
                    // The host may call back into closures reading the cell.
                    let mut value = cell.borrow().clone();
                    let result = (method.body)(Some(&mut value), &args);
                    *cell.borrow_mut() = value;
                    result?
                }
                mut receiver => (method.body)(Some(&mut receiver), &args)?,
            }
        };
        if !method.ret.is_void() {
            self.stack.push(result);
        }
        Ok(())
    }

    fn deref(&self, value: Value) -> Result<Value, ExecutionError> {
        Ok(match value {
            Value::Address(Address::Local(slot)) => self.locals[slot as usize].clone(),
            Value::Address(Address::Cell(cell)) => cell.borrow().clone(),
            other => other,
        })
    }

    fn constant(&self, index: u32) -> Result<&Value, ExecutionError> {
        self.record.constants().get(index as usize).ok_or_else(|| {
            ExecutionError::internal(format!("closure record has no constant {}", index))
        })
    }

    fn captured(&self, index: u32) -> Result<&SharedCell, ExecutionError> {
        self.record.variables().get(index as usize).ok_or_else(|| {
            ExecutionError::internal(format!("closure record has no variable {}", index))
        })
    }

    fn local_cell(&self, slot: u32) -> Result<&SharedCell, ExecutionError> {
        match &self.locals[slot as usize] {
            Value::Cell(cell) => Ok(cell),
            other => Err(ExecutionError::internal(format!(
                "local {} is not boxed: {:?}",
                slot, other
            ))),
        }
    }

    #[inline]
    fn pop(&mut self) -> Result<Value, ExecutionError> {
        self.stack
            .pop()
            .ok_or_else(|| ExecutionError::internal("operand stack underflow"))
    }

    #[inline]
    fn peek(&self) -> Result<&Value, ExecutionError> {
        self.stack
            .peek()
            .ok_or_else(|| ExecutionError::internal("operand stack underflow"))
    }

    fn pop_bool(&mut self) -> Result<bool, ExecutionError> {
        let value = self.pop()?;
        value
            .as_bool()
            .ok_or_else(|| ExecutionError::internal(format!("expected bool, got {:?}", value)))
    }

    fn pop_args(&mut self, count: usize) -> Result<Args, ExecutionError> {
        self.stack
            .pop_n(count)
            .ok_or_else(|| ExecutionError::internal("operand stack underflow"))
    }
}

/// Instruction range of the finally or fault block of a handler entry.
fn block_of(code: &Code, handler: usize) -> core::ops::Range<usize> {
    match code.handlers[handler].kind {
        HandlerKind::Finally { target, end } | HandlerKind::Fault { target, end } => {
            target as usize..end as usize
        }
        HandlerKind::Catch { .. } => 0..0,
    }
}
