use super::{Exception, Function};
use crate::evaluator::ExecutionError;
use crate::types::{NumKind, StructDef, StructKind, Type};
use crate::vm::OpenUnit;
use crate::{String, ToString, Vec};
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

/// A mutable variable shared between a unit and the closures that capture it.
pub type SharedCell = Rc<RefCell<Value>>;

/// Fields of a struct or class instance, in layout order.
#[derive(Debug, Clone)]
pub struct StructData {
    pub def: Rc<StructDef>,
    pub fields: Vec<Value>,
}

/// Location of a value-type receiver that is mutated in place.
#[derive(Debug, Clone)]
pub enum Address {
    /// A local slot of the executing frame.
    Local(u32),
    /// A boxed variable.
    Cell(SharedCell),
}

#[derive(Clone)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    /// Value-type instance; copy-on-write.
    Struct(Rc<StructData>),
    /// Class instance.
    Object(Rc<RefCell<StructData>>),
    Function(Rc<dyn Function>),
    Exception(Rc<Exception>),
    #[doc(hidden)]
    Cell(SharedCell),
    #[doc(hidden)]
    Address(Address),
    #[doc(hidden)]
    OpenUnit(Rc<OpenUnit>),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn function(f: impl Function + 'static) -> Value {
        Value::Function(Rc::new(f))
    }

    pub fn exception(e: Exception) -> Value {
        Value::Exception(Rc::new(e))
    }

    pub fn cell(v: Value) -> Value {
        Value::Cell(Rc::new(RefCell::new(v)))
    }

    /// Builds an instance of `def`; missing trailing fields get their defaults.
    pub fn new_struct(def: &Rc<StructDef>, mut fields: Vec<Value>) -> Value {
        let layout = def.all_fields();
        for field in layout.iter().skip(fields.len()) {
            fields.push(Value::default_for(&field.ty));
        }
        let data = StructData {
            def: def.clone(),
            fields,
        };
        match def.kind {
            StructKind::Value => Value::Struct(Rc::new(data)),
            StructKind::Class => Value::Object(Rc::new(RefCell::new(data))),
        }
    }

    /// Converts `n` to a numeric value of `kind`, wrapping like `as`.
    pub fn num_from_i64(kind: NumKind, n: i64) -> Value {
        match kind {
            NumKind::I8 => Value::I8(n as i8),
            NumKind::I16 => Value::I16(n as i16),
            NumKind::I32 => Value::I32(n as i32),
            NumKind::I64 => Value::I64(n),
            NumKind::U8 => Value::U8(n as u8),
            NumKind::U16 => Value::U16(n as u16),
            NumKind::U32 => Value::U32(n as u32),
            NumKind::U64 => Value::U64(n as u64),
            NumKind::F32 => Value::F32(n as f32),
            NumKind::F64 => Value::F64(n as f64),
        }
    }

    /// The zero / false / null value of a type.
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Void => Value::Unit,
            Type::Bool => Value::Bool(false),
            Type::Num(kind) => Value::num_from_i64(*kind, 0),
            Type::Struct(def) if def.kind == StructKind::Value => Value::new_struct(def, Vec::new()),
            Type::Nullable(_)
            | Type::Str
            | Type::Array(_)
            | Type::Struct(_)
            | Type::Function(_)
            | Type::Exception
            | Type::Object => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn num_kind(&self) -> Option<NumKind> {
        Some(match self {
            Value::I8(_) => NumKind::I8,
            Value::I16(_) => NumKind::I16,
            Value::I32(_) => NumKind::I32,
            Value::I64(_) => NumKind::I64,
            Value::U8(_) => NumKind::U8,
            Value::U16(_) => NumKind::U16,
            Value::U32(_) => NumKind::U32,
            Value::U64(_) => NumKind::U64,
            Value::F32(_) => NumKind::F32,
            Value::F64(_) => NumKind::F64,
            _ => return None,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(n) => Some(*n),
            _ => None,
        }
    }

    /// Any integer value widened to `i64` (array indices and lengths).
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::I8(n) => Some(*n as i64),
            Value::I16(n) => Some(*n as i64),
            Value::I32(n) => Some(*n as i64),
            Value::I64(n) => Some(*n),
            Value::U8(n) => Some(*n as i64),
            Value::U16(n) => Some(*n as i64),
            Value::U32(n) => Some(*n as i64),
            Value::U64(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<dyn Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Heap identity of values that must be shared rather than copied into
    /// bytecode. Strings are treated as interned and have none.
    pub fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Array(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Object(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Function(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Exception(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Cell(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::OpenUnit(rc) => Some(Rc::as_ptr(rc) as *const ()),
            _ => None,
        }
    }

    /// Equality as computed by the `==` operator.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => {
                Rc::ptr_eq(&a.def, &b.def)
                    && a.fields.iter().zip(&b.fields).all(|(x, y)| x.equals(y))
            }
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Whether two literals can share one literal-table entry.
    pub(crate) fn same_literal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Struct(a), Value::Struct(b)) => Rc::ptr_eq(a, b),
            _ => self.equals(other),
        }
    }

    /// Runtime type test used by catch clauses and checked casts.
    pub fn is_instance_of(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Null | Value::Unit, _) => false,
            (_, Type::Object) => true,
            (_, Type::Nullable(inner)) => self.is_instance_of(inner),
            (Value::Bool(_), Type::Bool) => true,
            (_, Type::Num(kind)) => self.num_kind() == Some(*kind),
            (Value::Str(_), Type::Str) => true,
            (Value::Array(_), Type::Array(_)) => true,
            (Value::Function(_), Type::Function(_)) => true,
            (Value::Exception(_), Type::Exception) => true,
            (Value::Struct(data), Type::Struct(def)) => Rc::ptr_eq(&data.def, def),
            (Value::Object(data), Type::Struct(def)) => data.borrow().def.derives_from(def),
            _ => false,
        }
    }

    /// Runtime class of a struct or object value.
    pub fn struct_def(&self) -> Option<Rc<StructDef>> {
        match self {
            Value::Struct(data) => Some(data.def.clone()),
            Value::Object(data) => Some(data.borrow().def.clone()),
            _ => None,
        }
    }

    pub fn field(&self, index: usize) -> Result<Value, ExecutionError> {
        match self {
            Value::Struct(data) => Ok(data.fields[index].clone()),
            Value::Object(data) => Ok(data.borrow().fields[index].clone()),
            Value::Cell(cell) => cell.borrow().field(index),
            Value::Null => Err(ExecutionError::raise(Exception::null_reference())),
            other => Err(ExecutionError::internal(alloc::format!(
                "field access on {:?}",
                other
            ))),
        }
    }

    pub fn set_field(&mut self, index: usize, value: Value) -> Result<(), ExecutionError> {
        match self {
            Value::Struct(data) => {
                Rc::make_mut(data).fields[index] = value;
                Ok(())
            }
            Value::Object(data) => {
                data.borrow_mut().fields[index] = value;
                Ok(())
            }
            Value::Cell(cell) => cell.borrow_mut().set_field(index, value),
            Value::Null => Err(ExecutionError::raise(Exception::null_reference())),
            other => Err(ExecutionError::internal(alloc::format!(
                "field store on {:?}",
                other
            ))),
        }
    }
}

impl Value {
    /// Runs `f` on the items of an array and a checked element index.
    pub fn with_element<R>(
        &self,
        index: &Value,
        f: impl FnOnce(&mut Vec<Value>, usize) -> R,
    ) -> Result<R, ExecutionError> {
        let Value::Array(items) = self else {
            return match self {
                Value::Null => Err(Exception::null_reference().into()),
                other => Err(ExecutionError::internal(alloc::format!(
                    "element access on {:?}",
                    other
                ))),
            };
        };
        let index = index.as_index().ok_or_else(|| {
            ExecutionError::internal(alloc::format!("array index {:?}", index))
        })?;
        let mut items = items.borrow_mut();
        let len = items.len();
        if index < 0 || index as usize >= len {
            return Err(Exception::index_out_of_range(index, len).into());
        }
        Ok(f(&mut items, index as usize))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::I32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::I64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::F64(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::I8(n) => write!(f, "I8({})", n),
            Value::I16(n) => write!(f, "I16({})", n),
            Value::I32(n) => write!(f, "I32({})", n),
            Value::I64(n) => write!(f, "I64({})", n),
            Value::U8(n) => write!(f, "U8({})", n),
            Value::U16(n) => write!(f, "U16({})", n),
            Value::U32(n) => write!(f, "U32({})", n),
            Value::U64(n) => write!(f, "U64({})", n),
            Value::F32(n) => write!(f, "F32({:?})", n),
            Value::F64(n) => write!(f, "F64({:?})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Struct(data) => write!(f, "{} {:?}", data.def.name, data.fields),
            Value::Object(data) => {
                let data = data.borrow();
                write!(f, "{} {:?}", data.def.name, data.fields)
            }
            Value::Function(func) => write!(f, "<function {:?}>", func.signature()),
            Value::Exception(e) => write!(f, "Exception({})", e),
            Value::Cell(cell) => write!(f, "Cell({:?})", cell.borrow()),
            Value::Address(addr) => write!(f, "Address({:?})", addr),
            Value::OpenUnit(unit) => write!(f, "<open unit {:?}>", unit.code().name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I8(n) => write!(f, "{}", n),
            Value::I16(n) => write!(f, "{}", n),
            Value::I32(n) => write!(f, "{}", n),
            Value::I64(n) => write!(f, "{}", n),
            Value::U8(n) => write!(f, "{}", n),
            Value::U16(n) => write!(f, "{}", n),
            Value::U32(n) => write!(f, "{}", n),
            Value::U64(n) => write!(f, "{}", n),
            Value::F32(n) => format_float(f, *n as f64),
            Value::F64(n) => format_float(f, *n),
            Value::Str(s) => write!(f, "\"{}\"", escape_string(s)),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Exception(e) => write!(f, "{}", e),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Format a float ensuring it always has a decimal point.
fn format_float(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_nan() {
        write!(f, "nan")
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            write!(f, "inf")
        } else {
            write!(f, "-inf")
        }
    } else {
        let s = value.to_string();
        if s.contains('.') || s.contains('e') || s.contains('E') {
            write!(f, "{}", s)
        } else {
            write!(f, "{}.", s)
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&alloc::format!("\\u{{{:04x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
