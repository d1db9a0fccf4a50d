//! Host struct and class definitions: fields, methods, properties, indexers.

use super::Type;
use crate::evaluator::ExecutionError;
use crate::values::Value;
use crate::{String, ToString, Vec};
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

/// Native body of a host method.
///
/// Instance methods receive their receiver as `Some`. Value-type receivers
/// passed by address can be mutated in place through it.
pub type NativeMethod =
    fn(receiver: Option<&mut Value>, args: &[Value]) -> Result<Value, ExecutionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    /// Copied on assignment and argument passing.
    Value,
    /// Reference identity, may derive from a base class.
    Class,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
}

pub struct MethodDef {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_static: bool,
    pub is_virtual: bool,
    pub mutates_receiver: bool,
    pub body: NativeMethod,
}

impl MethodDef {
    pub fn new_static(name: &str, params: Vec<Type>, ret: Type, body: NativeMethod) -> Self {
        Self {
            name: name.to_string(),
            params,
            ret,
            is_static: true,
            is_virtual: false,
            mutates_receiver: false,
            body,
        }
    }

    pub fn new_instance(name: &str, params: Vec<Type>, ret: Type, body: NativeMethod) -> Self {
        Self {
            is_static: false,
            ..Self::new_static(name, params, ret, body)
        }
    }

    pub fn with_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn with_mutating_receiver(mut self) -> Self {
        self.mutates_receiver = true;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn into_rc(self) -> Rc<MethodDef> {
        Rc::new(self)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("is_static", &self.is_static)
            .field("is_virtual", &self.is_virtual)
            .finish()
    }
}

impl fmt::Display for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Indexer {
    pub getter: Rc<MethodDef>,
    pub setter: Option<Rc<MethodDef>>,
}

#[derive(Debug, Clone)]
struct PropertyDef {
    name: String,
    ty: Type,
    getter: Rc<MethodDef>,
    setter: Option<Rc<MethodDef>>,
}

/// A resolved field or property of a struct.
#[derive(Debug, Clone)]
pub enum Member {
    Field {
        owner: Rc<StructDef>,
        /// Position in the full instance layout (base fields first).
        index: usize,
        name: String,
        ty: Type,
    },
    Property {
        owner: Rc<StructDef>,
        name: String,
        ty: Type,
        getter: Rc<MethodDef>,
        setter: Option<Rc<MethodDef>>,
    },
}

impl Member {
    pub fn ty(&self) -> &Type {
        match self {
            Member::Field { ty, .. } | Member::Property { ty, .. } => ty,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Member::Field { name, .. } | Member::Property { name, .. } => name,
        }
    }

    pub fn owner(&self) -> &Rc<StructDef> {
        match self {
            Member::Field { owner, .. } | Member::Property { owner, .. } => owner,
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Member::Field { .. } => true,
            Member::Property { setter, .. } => setter.is_some(),
        }
    }
}

/// A host-defined struct (value type) or class.
///
/// Methods, properties and the indexer are registered after the definition
/// exists so their signatures can mention the type itself.
pub struct StructDef {
    pub name: String,
    pub kind: StructKind,
    pub base: Option<Rc<StructDef>>,
    fields: Vec<FieldDef>,
    methods: RefCell<Vec<Rc<MethodDef>>>,
    properties: RefCell<Vec<PropertyDef>>,
    indexer: RefCell<Option<Rc<Indexer>>>,
}

impl StructDef {
    pub fn value(name: &str) -> StructDefBuilder {
        StructDefBuilder::new(name, StructKind::Value)
    }

    pub fn class(name: &str) -> StructDefBuilder {
        StructDefBuilder::new(name, StructKind::Class)
    }

    pub fn ty(self: &Rc<Self>) -> Type {
        Type::Struct(self.clone())
    }

    pub fn field_count(&self) -> usize {
        self.base.as_ref().map_or(0, |base| base.field_count()) + self.fields.len()
    }

    /// Field definitions in instance layout order.
    pub fn all_fields(&self) -> Vec<FieldDef> {
        let mut fields = match &self.base {
            Some(base) => base.all_fields(),
            None => Vec::new(),
        };
        fields.extend(self.fields.iter().cloned());
        fields
    }

    fn field_slot(&self, name: &str) -> Option<(usize, Type)> {
        let base_count = self.base.as_ref().map_or(0, |base| base.field_count());
        if let Some(pos) = self.fields.iter().position(|f| f.name == name) {
            return Some((base_count + pos, self.fields[pos].ty.clone()));
        }
        self.base.as_ref().and_then(|base| base.field_slot(name))
    }

    /// Resolves a field or property by name, searching base classes.
    pub fn member(self: &Rc<Self>, name: &str) -> Option<Member> {
        if let Some((index, ty)) = self.field_slot(name) {
            return Some(Member::Field {
                owner: self.clone(),
                index,
                name: name.to_string(),
                ty,
            });
        }
        let mut current = Some(self.clone());
        while let Some(def) = current {
            let found = def
                .properties
                .borrow()
                .iter()
                .find(|p| p.name == name)
                .cloned();
            if let Some(p) = found {
                return Some(Member::Property {
                    owner: def.clone(),
                    name: p.name,
                    ty: p.ty,
                    getter: p.getter,
                    setter: p.setter,
                });
            }
            current = def.base.clone();
        }
        None
    }

    pub fn add_method(&self, method: MethodDef) -> Rc<MethodDef> {
        let method = Rc::new(method);
        self.methods.borrow_mut().push(method.clone());
        method
    }

    pub fn add_property(
        &self,
        name: &str,
        ty: Type,
        getter: MethodDef,
        setter: Option<MethodDef>,
    ) {
        self.properties.borrow_mut().push(PropertyDef {
            name: name.to_string(),
            ty,
            getter: Rc::new(getter),
            setter: setter.map(Rc::new),
        });
    }

    pub fn set_indexer(&self, getter: MethodDef, setter: Option<MethodDef>) -> Rc<Indexer> {
        let indexer = Rc::new(Indexer {
            getter: Rc::new(getter),
            setter: setter.map(Rc::new),
        });
        *self.indexer.borrow_mut() = Some(indexer.clone());
        indexer
    }

    pub fn indexer(&self) -> Option<Rc<Indexer>> {
        let own = self.indexer.borrow().clone();
        own.or_else(|| self.base.as_ref().and_then(|base| base.indexer()))
    }

    /// Finds a method by name, most derived first. This is the virtual
    /// dispatch lookup when called on a runtime class.
    pub fn find_method(&self, name: &str) -> Option<Rc<MethodDef>> {
        let own = self
            .methods
            .borrow()
            .iter()
            .rev()
            .find(|m| m.name == name)
            .cloned();
        own.or_else(|| self.base.as_ref().and_then(|base| base.find_method(name)))
    }

    /// Finds a static operator method (`op_Addition` and friends) whose
    /// parameters accept the given operand types.
    pub fn find_operator(&self, name: &str, operands: &[&Type]) -> Option<Rc<MethodDef>> {
        let own = self
            .methods
            .borrow()
            .iter()
            .find(|m| {
                m.is_static
                    && m.name == name
                    && m.params.len() == operands.len()
                    && m.params
                        .iter()
                        .zip(operands)
                        .all(|(param, operand)| param.is_assignable_from(operand))
            })
            .cloned();
        own.or_else(|| {
            self.base
                .as_ref()
                .and_then(|base| base.find_operator(name, operands))
        })
    }

    pub fn derives_from(&self, other: &StructDef) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        self.base
            .as_ref()
            .is_some_and(|base| base.derives_from(other))
    }
}

impl fmt::Debug for StructDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

pub struct StructDefBuilder {
    name: String,
    kind: StructKind,
    base: Option<Rc<StructDef>>,
    fields: Vec<FieldDef>,
}

impl StructDefBuilder {
    fn new(name: &str, kind: StructKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base: None,
            fields: Vec::new(),
        }
    }

    pub fn base(mut self, base: Rc<StructDef>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn field(mut self, name: &str, ty: Type) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn build(self) -> Rc<StructDef> {
        Rc::new(StructDef {
            name: self.name,
            kind: self.kind,
            base: self.base,
            fields: self.fields,
            methods: RefCell::new(Vec::new()),
            properties: RefCell::new(Vec::new()),
            indexer: RefCell::new(None),
        })
    }
}
