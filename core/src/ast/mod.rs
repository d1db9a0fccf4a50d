//! Immutable expression trees.
//!
//! Nodes are reference counted and never mutated after construction, so the
//! same subtree can be shared between several parents and walked by several
//! passes at once. Parameters, label targets and lambdas have identity: two
//! references denote the same variable, label or lambda exactly when they point
//! at the same allocation.
//!
//! Trees are built with the validating constructors in [`builder`].

pub mod builder;
mod error;


pub use error::BuildError;

use crate::types::{Indexer, Member, MethodDef, Signature, Type};
use crate::values::Value;
use crate::{String, Vec};
use alloc::rc::Rc;

pub type ExprRef = Rc<Expr>;

#[derive(Debug)]
pub struct Expr {
    pub ty: Type,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Constant(Value),
    Parameter(Rc<ParameterExpr>),
    Unary {
        op: UnaryOp,
        operand: Option<ExprRef>,
        method: Option<Rc<MethodDef>>,
    },
    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
        method: Option<Rc<MethodDef>>,
    },
    Call {
        object: Option<ExprRef>,
        method: Rc<MethodDef>,
        args: Vec<ExprRef>,
    },
    New(NewExpr),
    MemberAccess {
        object: ExprRef,
        member: Member,
    },
    Index {
        object: ExprRef,
        indexer: Option<Rc<Indexer>>,
        args: Vec<ExprRef>,
    },
    NewArray {
        element: Type,
        init: ArrayInit,
    },
    MemberInit {
        new: NewExpr,
        bindings: Vec<MemberBinding>,
    },
    Conditional {
        test: ExprRef,
        if_true: ExprRef,
        if_false: ExprRef,
    },
    Block {
        variables: Vec<Rc<ParameterExpr>>,
        exprs: Vec<ExprRef>,
    },
    Loop {
        body: ExprRef,
        break_label: Option<Rc<LabelTarget>>,
        continue_label: Option<Rc<LabelTarget>>,
    },
    Try(TryExpr),
    Label {
        target: Rc<LabelTarget>,
        default: Option<ExprRef>,
    },
    Goto {
        kind: GotoKind,
        target: Rc<LabelTarget>,
        value: Option<ExprRef>,
    },
    Switch(SwitchExpr),
    Lambda(Rc<LambdaExpr>),
    Invoke {
        target: ExprRef,
        args: Vec<ExprRef>,
    },
    Default,
}

impl Expr {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Constant(_) => "Constant",
            ExprKind::Parameter(_) => "Parameter",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Call { .. } => "Call",
            ExprKind::New(_) => "New",
            ExprKind::MemberAccess { .. } => "MemberAccess",
            ExprKind::Index { .. } => "Index",
            ExprKind::NewArray { .. } => "NewArray",
            ExprKind::MemberInit { .. } => "MemberInit",
            ExprKind::Conditional { .. } => "Conditional",
            ExprKind::Block { .. } => "Block",
            ExprKind::Loop { .. } => "Loop",
            ExprKind::Try(_) => "Try",
            ExprKind::Label { .. } => "Label",
            ExprKind::Goto { .. } => "Goto",
            ExprKind::Switch(_) => "Switch",
            ExprKind::Lambda(_) => "Lambda",
            ExprKind::Invoke { .. } => "Invoke",
            ExprKind::Default => "Default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    UnaryPlus,
    /// Logical not on `bool`, bitwise complement on integers.
    Not,
    Convert,
    ArrayLength,
    /// Without an operand: rethrow the exception being handled.
    Throw,
    Increment,
    Decrement,
    PreIncrementAssign,
    PreDecrementAssign,
    PostIncrementAssign,
    PostDecrementAssign,
}

impl UnaryOp {
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            UnaryOp::PreIncrementAssign
                | UnaryOp::PreDecrementAssign
                | UnaryOp::PostIncrementAssign
                | UnaryOp::PostDecrementAssign
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    ExclusiveOr,
    LeftShift,
    RightShift,
    AndAlso,
    OrElse,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Coalesce,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    /// The arithmetic operator a compound assignment applies.
    pub fn compound_base(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::AddAssign => BinaryOp::Add,
            BinaryOp::SubtractAssign => BinaryOp::Subtract,
            BinaryOp::MultiplyAssign => BinaryOp::Multiply,
            BinaryOp::DivideAssign => BinaryOp::Divide,
            BinaryOp::ModuloAssign => BinaryOp::Modulo,
            _ => return None,
        })
    }

    /// Host operator method for struct operands, looked up by name on the
    /// operand types (left first).
    pub fn find_operator_method(self, left: &Type, right: &Type) -> Option<Rc<MethodDef>> {
        let name = self.operator_method_name()?;
        [left, right]
            .into_iter()
            .filter_map(|ty| ty.as_struct())
            .find_map(|def| def.find_operator(name, &[left, right]))
    }

    /// Name of the host operator method implementing this operator.
    pub fn operator_method_name(self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Add => "op_Addition",
            BinaryOp::Subtract => "op_Subtraction",
            BinaryOp::Multiply => "op_Multiply",
            BinaryOp::Divide => "op_Division",
            BinaryOp::Modulo => "op_Modulus",
            BinaryOp::And => "op_BitwiseAnd",
            BinaryOp::Or => "op_BitwiseOr",
            BinaryOp::ExclusiveOr => "op_ExclusiveOr",
            BinaryOp::Equal => "op_Equality",
            BinaryOp::NotEqual => "op_Inequality",
            BinaryOp::LessThan => "op_LessThan",
            BinaryOp::LessThanOrEqual => "op_LessThanOrEqual",
            BinaryOp::GreaterThan => "op_GreaterThan",
            BinaryOp::GreaterThanOrEqual => "op_GreaterThanOrEqual",
            _ => return None,
        })
    }
}

/// A variable: lambda parameter, block variable or catch variable.
#[derive(Debug)]
pub struct ParameterExpr {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug)]
pub struct LabelTarget {
    pub name: Option<String>,
    /// Type of the value carried by jumps to this label.
    pub ty: Type,
}

impl LabelTarget {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

#[derive(Debug)]
pub struct LambdaExpr {
    pub name: Option<String>,
    pub params: Vec<Rc<ParameterExpr>>,
    pub body: ExprRef,
    pub signature: Rc<Signature>,
}

impl LambdaExpr {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

#[derive(Debug)]
pub struct NewExpr {
    pub def: Rc<crate::types::StructDef>,
    /// Static factory method; positional field initialization when absent.
    pub constructor: Option<Rc<MethodDef>>,
    pub args: Vec<ExprRef>,
}

#[derive(Debug)]
pub enum ArrayInit {
    Elements(Vec<ExprRef>),
    Bounds(ExprRef),
}

#[derive(Debug)]
pub enum MemberBinding {
    Assign(Member, ExprRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoKind {
    Goto,
    Return,
    Break,
    Continue,
}

#[derive(Debug)]
pub struct CatchBlock {
    pub test: Type,
    pub variable: Option<Rc<ParameterExpr>>,
    pub filter: Option<ExprRef>,
    pub body: ExprRef,
}

#[derive(Debug)]
pub struct TryExpr {
    pub body: ExprRef,
    pub handlers: Vec<CatchBlock>,
    pub finally: Option<ExprRef>,
    pub fault: Option<ExprRef>,
}

#[derive(Debug)]
pub struct SwitchCase {
    pub tests: Vec<ExprRef>,
    pub body: ExprRef,
}

#[derive(Debug)]
pub struct SwitchExpr {
    pub value: ExprRef,
    pub cases: Vec<SwitchCase>,
    pub default: Option<ExprRef>,
    pub comparison: Option<Rc<MethodDef>>,
}

/// Identity key of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamKey(*const ParameterExpr);

impl ParamKey {
    pub fn of(param: &Rc<ParameterExpr>) -> Self {
        ParamKey(Rc::as_ptr(param))
    }
}

/// Identity key of a label target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelKey(*const LabelTarget);

impl LabelKey {
    pub fn of(label: &Rc<LabelTarget>) -> Self {
        LabelKey(Rc::as_ptr(label))
    }
}

/// Identity key of a lambda node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LambdaKey(*const LambdaExpr);

impl LambdaKey {
    pub fn of(lambda: &Rc<LambdaExpr>) -> Self {
        LambdaKey(Rc::as_ptr(lambda))
    }
}

/// Identity key of a `try` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TryKey(*const TryExpr);

impl TryKey {
    pub fn of(node: &TryExpr) -> Self {
        TryKey(node as *const TryExpr)
    }
}
