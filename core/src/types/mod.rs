//! Static type model for expression trees.
//!
//! Types are plain values: cheap to clone (`Rc` for the composite ones) and
//! compared structurally, except for host structs which compare by definition
//! identity.

mod members;


pub use members::{
    FieldDef, Indexer, Member, MethodDef, NativeMethod, StructDef, StructDefBuilder, StructKind,
};

use crate::Vec;
use alloc::rc::Rc;
use core::fmt;

/// Numeric representation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumKind {
    pub const fn bits(self) -> u32 {
        match self {
            NumKind::I8 | NumKind::U8 => 8,
            NumKind::I16 | NumKind::U16 => 16,
            NumKind::I32 | NumKind::U32 | NumKind::F32 => 32,
            NumKind::I64 | NumKind::U64 | NumKind::F64 => 64,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, NumKind::F32 | NumKind::F64)
    }

    pub const fn is_signed(self) -> bool {
        !matches!(
            self,
            NumKind::U8 | NumKind::U16 | NumKind::U32 | NumKind::U64
        )
    }

    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    const fn signed_of(bits: u32) -> NumKind {
        match bits {
            0..=32 => NumKind::I32,
            _ => NumKind::I64,
        }
    }

    const fn unsigned_of(bits: u32) -> NumKind {
        match bits {
            0..=32 => NumKind::U32,
            _ => NumKind::U64,
        }
    }

    /// The kind binary arithmetic between `a` and `b` is carried out in.
    ///
    /// Integer arithmetic never happens below 32 bits. Mixing signed and
    /// unsigned operands picks a signed kind one step wider than the unsigned
    /// operand, capped at 64 bits.
    pub const fn promote(a: NumKind, b: NumKind) -> NumKind {
        match (a.is_float(), b.is_float()) {
            (true, true) => {
                if a.bits() >= b.bits() {
                    a
                } else {
                    b
                }
            }
            (true, false) => a,
            (false, true) => b,
            (false, false) => {
                let bits = if a.bits() > b.bits() { a.bits() } else { b.bits() };
                match (a.is_signed(), b.is_signed()) {
                    (true, true) => NumKind::signed_of(bits),
                    (false, false) => NumKind::unsigned_of(bits),
                    _ => {
                        let unsigned_bits = if a.is_signed() { b.bits() } else { a.bits() };
                        let wanted = if unsigned_bits * 2 > bits {
                            unsigned_bits * 2
                        } else {
                            bits
                        };
                        NumKind::signed_of(wanted)
                    }
                }
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            NumKind::I8 => "i8",
            NumKind::I16 => "i16",
            NumKind::I32 => "i32",
            NumKind::I64 => "i64",
            NumKind::U8 => "u8",
            NumKind::U16 => "u16",
            NumKind::U32 => "u32",
            NumKind::U64 => "u64",
            NumKind::F32 => "f32",
            NumKind::F64 => "f64",
        }
    }
}

impl fmt::Display for NumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }
}

/// The static type of an expression.
#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Bool,
    Num(NumKind),
    Str,
    Nullable(Rc<Type>),
    Array(Rc<Type>),
    Struct(Rc<StructDef>),
    Function(Rc<Signature>),
    Exception,
    Object,
}

impl Type {
    pub const I8: Type = Type::Num(NumKind::I8);
    pub const I16: Type = Type::Num(NumKind::I16);
    pub const I32: Type = Type::Num(NumKind::I32);
    pub const I64: Type = Type::Num(NumKind::I64);
    pub const U8: Type = Type::Num(NumKind::U8);
    pub const U16: Type = Type::Num(NumKind::U16);
    pub const U32: Type = Type::Num(NumKind::U32);
    pub const U64: Type = Type::Num(NumKind::U64);
    pub const F32: Type = Type::Num(NumKind::F32);
    pub const F64: Type = Type::Num(NumKind::F64);

    pub fn nullable(inner: Type) -> Type {
        match inner {
            Type::Nullable(_) => inner,
            other => Type::Nullable(Rc::new(other)),
        }
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Rc::new(element))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function(Rc::new(Signature::new(params, ret)))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// Strips one level of `Nullable`.
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Numeric kind of a non-nullable numeric type.
    pub fn num_kind(&self) -> Option<NumKind> {
        match self {
            Type::Num(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Numeric kind of a numeric type, looking through `Nullable`.
    pub fn lifted_num_kind(&self) -> Option<NumKind> {
        self.underlying().num_kind()
    }

    pub fn as_struct(&self) -> Option<&Rc<StructDef>> {
        match self {
            Type::Struct(def) => Some(def),
            _ => None,
        }
    }

    /// Types whose values may be null without being wrapped in `Nullable`.
    pub fn is_reference(&self) -> bool {
        match self {
            Type::Str | Type::Array(_) | Type::Function(_) | Type::Exception | Type::Object => {
                true
            }
            Type::Struct(def) => def.kind == StructKind::Class,
            _ => false,
        }
    }

    pub fn is_value_struct(&self) -> bool {
        matches!(self, Type::Struct(def) if def.kind == StructKind::Value)
    }

    pub fn admits_null(&self) -> bool {
        self.is_nullable() || self.is_reference()
    }

    /// Whether a value of type `other` can be stored where `self` is expected
    /// without a conversion node.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Object, other) => !other.is_void(),
            (Type::Nullable(inner), other) => **inner == *other,
            (Type::Struct(base), Type::Struct(derived)) => derived.derives_from(base),
            _ => false,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Void, Type::Void)
            | (Type::Bool, Type::Bool)
            | (Type::Str, Type::Str)
            | (Type::Exception, Type::Exception)
            | (Type::Object, Type::Object) => true,
            (Type::Num(a), Type::Num(b)) => a == b,
            (Type::Nullable(a), Type::Nullable(b)) => a == b,
            (Type::Array(a), Type::Array(b)) => a == b,
            (Type::Struct(a), Type::Struct(b)) => Rc::ptr_eq(a, b),
            (Type::Function(a), Type::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Bool => f.write_str("bool"),
            Type::Num(kind) => write!(f, "{}", kind),
            Type::Str => f.write_str("str"),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::Array(element) => write!(f, "{}[]", element),
            Type::Struct(def) => f.write_str(&def.name),
            Type::Function(sig) => {
                f.write_str("(")?;
                for (i, param) in sig.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", sig.ret)
            }
            Type::Exception => f.write_str("exception"),
            Type::Object => f.write_str("object"),
        }
    }
}

/// Runtime representation class of a type.
///
/// Compiled units record the shape of each slot of their entry signature
/// (a leading `Record` slot for units bound to a closure record) and check
/// arguments against it on invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Unit,
    Bool,
    Num(NumKind),
    Str,
    Nullable,
    Struct,
    Reference,
    Record,
}

impl Shape {
    pub fn of(ty: &Type) -> Shape {
        match ty {
            Type::Void => Shape::Unit,
            Type::Bool => Shape::Bool,
            Type::Num(kind) => Shape::Num(*kind),
            Type::Str => Shape::Str,
            Type::Nullable(_) => Shape::Nullable,
            Type::Struct(def) if def.kind == StructKind::Value => Shape::Struct,
            Type::Array(_)
            | Type::Struct(_)
            | Type::Function(_)
            | Type::Exception
            | Type::Object => Shape::Reference,
        }
    }
}
