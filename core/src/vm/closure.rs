//! Closure records and the callables built on them.
//!
//! A compiled unit sees everything besides its declared parameters through
//! one closure record: the shared constants and nested units it was compiled
//! against, plus (for units created at a use site) the cells of the
//! variables it captured from enclosing units.

use alloc::rc::Rc;
use core::fmt;

use crate::{
    Vec,
    evaluator::ExecutionError,
    types::{Shape, Signature},
    values::{Function, SharedCell, Value},
    vm::{Code, VM},
};

#[derive(Clone, Default)]
pub enum ClosureRecord {
    /// Nothing captured.
    #[default]
    Empty,
    /// Identity constants followed by nested units.
    Constants(Rc<[Value]>),
    /// Constants plus variables captured from enclosing units, in the
    /// unit's capture order.
    WithVariables {
        constants: Rc<[Value]>,
        variables: Rc<[SharedCell]>,
    },
}

impl ClosureRecord {
    pub fn from_constants(constants: Vec<Value>) -> Self {
        if constants.is_empty() {
            ClosureRecord::Empty
        } else {
            ClosureRecord::Constants(constants.into())
        }
    }

    pub fn constants(&self) -> &[Value] {
        match self {
            ClosureRecord::Empty => &[],
            ClosureRecord::Constants(constants)
            | ClosureRecord::WithVariables { constants, .. } => constants,
        }
    }

    pub fn variables(&self) -> &[SharedCell] {
        match self {
            ClosureRecord::WithVariables { variables, .. } => variables,
            _ => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ClosureRecord::Empty)
    }
}

impl fmt::Debug for ClosureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosureRecord::Empty => f.write_str("ClosureRecord::Empty"),
            ClosureRecord::Constants(constants) => f
                .debug_tuple("ClosureRecord::Constants")
                .field(&constants.len())
                .finish(),
            ClosureRecord::WithVariables {
                constants,
                variables,
            } => f
                .debug_struct("ClosureRecord::WithVariables")
                .field("constants", &constants.len())
                .field("variables", &variables.len())
                .finish(),
        }
    }
}

/// A nested unit that captures variables from its enclosing units. It is
/// bound to a fresh record each time the enclosing unit evaluates the lambda.
pub struct OpenUnit {
    code: Rc<Code>,
    constants: Rc<[Value]>,
}

impl OpenUnit {
    pub fn new(code: Rc<Code>, constants: Vec<Value>) -> Self {
        Self {
            code,
            constants: constants.into(),
        }
    }

    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    /// Binds the unit to the given captured cells.
    pub fn bind(&self, variables: Vec<SharedCell>) -> BytecodeClosure {
        BytecodeClosure::new(
            self.code.clone(),
            ClosureRecord::WithVariables {
                constants: self.constants.clone(),
                variables: variables.into(),
            },
        )
    }
}

/// A compiled unit bound to its closure record.
pub struct BytecodeClosure {
    code: Rc<Code>,
    record: ClosureRecord,
}

impl BytecodeClosure {
    pub fn new(code: Rc<Code>, record: ClosureRecord) -> Self {
        Self { code, record }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn record(&self) -> &ClosureRecord {
        &self.record
    }

    fn check_shapes(&self, args: &[Value]) -> Result<(), ExecutionError> {
        let shapes = match self.code.shapes.first() {
            Some(Shape::Record) => &self.code.shapes[1..],
            _ => &self.code.shapes[..],
        };
        ExecutionError::check_arity(shapes.len(), args.len())?;
        for (shape, arg) in shapes.iter().zip(args) {
            if !admits(*shape, arg) {
                return Err(ExecutionError::internal(alloc::format!(
                    "argument {:?} does not fit parameter shape {:?}",
                    arg, shape
                )));
            }
        }
        Ok(())
    }
}

fn admits(shape: Shape, value: &Value) -> bool {
    match shape {
        Shape::Unit => matches!(value, Value::Unit),
        Shape::Bool => matches!(value, Value::Bool(_)),
        Shape::Num(kind) => value.num_kind() == Some(kind),
        Shape::Str => matches!(value, Value::Str(_) | Value::Null),
        Shape::Struct => matches!(value, Value::Struct(_)),
        Shape::Nullable | Shape::Reference => !matches!(value, Value::Unit),
        Shape::Record => false,
    }
}

impl Function for BytecodeClosure {
    fn signature(&self) -> &Signature {
        &self.code.signature
    }

    fn call(&self, args: &[Value]) -> Result<Value, ExecutionError> {
        self.check_shapes(args)?;
        VM::new(&self.code, &self.record, args).run()
    }
}

impl fmt::Debug for BytecodeClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytecodeClosure")
            .field("name", &self.code.name)
            .field("record", &self.record)
            .finish()
    }
}
