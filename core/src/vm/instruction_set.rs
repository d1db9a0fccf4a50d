//! VM instruction set.
//!
//! # Instruction Format
//!
//! Every instruction is a tag plus at most four bytes of operand, so the whole
//! enum fits in eight bytes. Operands index one of the side tables of
//! [`Code`](super::Code) (literals, methods, structs, types), a local slot, a
//! closure record entry, or an absolute instruction address.
//!
//! # Design Principles
//!
//! - **Stack-based**: operations consume operands from the stack and push results
//! - **Kind-explicit**: arithmetic names the numeric kind it runs in; operands are
//!   converted before the operation, never inside it
//! - **Table-driven exceptions**: protected regions live in the code's handler
//!   table, so entering a `try` costs nothing at runtime
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`

use crate::evaluator::{ArithOp, CmpOp};
use crate::types::NumKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ========================================================================
    // Special
    // ========================================================================
    /// Stop execution; reaching it is an internal error.
    Halt,
    Nop,

    // ========================================================================
    // Stack & Constants
    // ========================================================================
    /// Stack: [...] -> [..., null]
    ConstNull,
    /// Stack: [...] -> [..., ()]
    ConstUnit,
    /// Stack: [...] -> [..., bool]
    ConstBool(bool),
    /// Stack: [...] -> [..., i32]
    ConstI32(i32),
    /// Push entry of the literal table.
    /// Stack: [...] -> [..., value]
    ConstLiteral(u32),
    /// Push entry of the closure record's constant array.
    /// Stack: [...] -> [..., value]
    LoadConstant(u32),
    /// Stack: [..., a] -> [...]
    Pop,
    /// Stack: [..., a] -> [..., a, a]
    Dup,

    // ========================================================================
    // Locals & Captured Variables
    // ========================================================================
    /// Stack: [...] -> [..., local]
    LoadLocal(u32),
    /// Stack: [..., value] -> [...]
    StoreLocal(u32),
    /// Push the address of a local holding a value-type struct.
    /// Stack: [...] -> [..., address]
    LoadLocalAddress(u32),
    /// Move a value into a fresh shared cell stored in the slot.
    /// Stack: [..., value] -> [...]
    NewCell(u32),
    /// Read through the cell in a slot.
    /// Stack: [...] -> [..., value]
    LoadCell(u32),
    /// Write through the cell in a slot.
    /// Stack: [..., value] -> [...]
    StoreCell(u32),
    /// Stack: [...] -> [..., address]
    LoadCellAddress(u32),
    /// Read a variable captured in the closure record.
    /// Stack: [...] -> [..., value]
    LoadCaptured(u32),
    /// Stack: [..., value] -> [...]
    StoreCaptured(u32),
    /// Push the captured cell itself, to forward it to a nested closure.
    /// Stack: [...] -> [..., cell]
    LoadCapturedCell(u32),
    /// Stack: [...] -> [..., address]
    LoadCapturedAddress(u32),

    // ========================================================================
    // Operators
    // ========================================================================
    /// Stack: [..., a, b] -> [..., a op b]
    Arith(ArithOp, NumKind),
    /// Non-short-circuit `&`, `|` or `^` on booleans.
    /// Stack: [..., bool, bool] -> [..., bool]
    Logical(ArithOp),
    /// Stack: [..., a, b] -> [..., bool]
    Compare(CmpOp, NumKind),
    /// Stack: [..., a] -> [..., -a]
    Negate(NumKind),
    /// Logical or bitwise not.
    /// Stack: [..., a] -> [..., !a]
    Not,
    /// Numeric conversion to the given kind.
    /// Stack: [..., a] -> [..., a as kind]
    Convert(NumKind),
    /// Stack: [..., a, b] -> [..., a == b]
    Eq,
    /// Stack: [..., a, b] -> [..., a != b]
    NotEq,
    /// Stack: [..., str, str] -> [..., str]
    Concat,
    /// Raise `InvalidOperation` on null.
    /// Stack: [..., value] -> [..., value]
    UnwrapNullable,
    /// Checked reference conversion to a type-table entry; null passes.
    /// Stack: [..., value] -> [..., value]
    CastClass(u32),

    // ========================================================================
    // Control Flow (absolute targets)
    // ========================================================================
    Jump(u32),
    /// Stack: [..., bool] -> [...]
    JumpIfFalse(u32),
    /// Stack: [..., bool] -> [...]
    JumpIfTrue(u32),
    /// Stack: [..., value] -> [...]
    JumpIfNull(u32),
    /// Stack: [..., value] -> [...]
    JumpIfNotNull(u32),
    /// Exit protected regions, running every finally block crossed on the way.
    Leave(u32),
    /// End of a finally or fault block: resume the pending leave or rethrow.
    EndFinally,
    /// Stack: [..., exception] -> (unwinds)
    Throw,
    /// Stack: [..., value] -> (returns)
    Return,

    // ========================================================================
    // Calls & Closures
    // ========================================================================
    /// Call a method-table entry. Instance methods take the receiver below
    /// their arguments; void methods push nothing.
    /// Stack: [..., receiver?, args...] -> [..., result?]
    Call(u32),
    /// Like `Call`, resolving the method by name on the receiver's runtime class.
    CallVirtual(u32),
    /// Stack: [..., callable, args...] -> [..., result]
    Invoke(u32),
    /// Bind an open nested unit to a fresh closure record holding `k` cells.
    /// Stack: [..., unit, cell_1, ..., cell_k] -> [..., callable]
    Curry(u32),

    // ========================================================================
    // Structs & Arrays
    // ========================================================================
    /// Instantiate a struct-table entry from leading field values.
    /// Stack: [..., field_1, ..., field_n] -> [..., instance]
    NewStruct(u16, u16),
    /// Stack: [..., receiver] -> [..., field]
    LoadField(u32),
    /// Stack: [..., receiver, value] -> [...]
    StoreField(u32),
    /// Stack: [..., item_1, ..., item_n] -> [..., array]
    NewArray(u32),
    /// Array of default elements (a literal-table entry).
    /// Stack: [..., length] -> [..., array]
    NewArrayBounds(u32),
    /// Stack: [..., array, index] -> [..., item]
    LoadElement,
    /// Stack: [..., array, index, value] -> [...]
    StoreElement,
    /// Stack: [..., array] -> [..., i32]
    ArrayLength,
}

static_assertions::assert_eq_size!(Instruction, u64);

impl Instruction {
    /// Absolute jump target, if this is a jump.
    pub const fn jump_target(&self) -> Option<u32> {
        match self {
            Self::Jump(target)
            | Self::JumpIfFalse(target)
            | Self::JumpIfTrue(target)
            | Self::JumpIfNull(target)
            | Self::JumpIfNotNull(target)
            | Self::Leave(target) => Some(*target),
            _ => None,
        }
    }

    /// Redirects a jump; other instructions are returned unchanged.
    pub(crate) const fn with_jump_target(self, target: u32) -> Self {
        match self {
            Self::Jump(_) => Self::Jump(target),
            Self::JumpIfFalse(_) => Self::JumpIfFalse(target),
            Self::JumpIfTrue(_) => Self::JumpIfTrue(target),
            Self::JumpIfNull(_) => Self::JumpIfNull(target),
            Self::JumpIfNotNull(_) => Self::JumpIfNotNull(target),
            Self::Leave(_) => Self::Leave(target),
            other => other,
        }
    }

    /// Check if this instruction can raise an exception
    pub const fn can_throw(&self) -> bool {
        matches!(
            self,
            Self::Arith(ArithOp::Div | ArithOp::Rem, _)
                | Self::UnwrapNullable
                | Self::CastClass(_)
                | Self::Throw
                | Self::Call(_)
                | Self::CallVirtual(_)
                | Self::Invoke(_)
                | Self::LoadField(_)
                | Self::StoreField(_)
                | Self::NewArrayBounds(_)
                | Self::LoadElement
                | Self::StoreElement
                | Self::ArrayLength
        )
    }
}
