//! Closure plans: what a compiled unit needs besides its parameters.
//!
//! The collector fills one [`ClosureInfo`] per unit (the top-level lambda and
//! every nested lambda); the emitter then reads it and assigns hoisted slots
//! and bytecode labels while it walks the same tree. All collections live in
//! the compile session's arena and are dropped with it.

use alloc::rc::Rc;

use allocator_api2::vec::Vec as ArenaVec;
use bitflags::bitflags;
use bumpalo::Bump;
use hashbrown::{DefaultHashBuilder, HashMap, HashSet};

use crate::{
    Vec,
    ast::{LabelKey, LabelTarget, LambdaExpr, LambdaKey, ParamKey, ParameterExpr, TryKey},
    values::Value,
};

pub(crate) type ArenaMap<'s, K, V> = HashMap<K, V, DefaultHashBuilder, &'s Bump>;
pub(crate) type ArenaSet<'s, K> = HashSet<K, DefaultHashBuilder, &'s Bump>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClosureStatus: u8 {
        /// The collector has not finished walking the unit yet.
        const NEEDS_COLLECTION = 1 << 0;
        /// The closure record was supplied by the caller; nothing is collected.
        const USER_SUPPLIED = 1 << 1;
        /// The unit reads constants, nested units or captured variables
        /// through a closure record.
        const HAS_CLOSURE = 1 << 2;
        /// The unit captures no variables and is bound once, at compile time.
        const MUST_BE_STATIC = 1 << 3;
    }
}

/// An identity constant referenced by the unit.
#[derive(Debug)]
pub(crate) struct ConstantEntry {
    pub value: Value,
    pub usage: u32,
    /// Local slot the constant is loaded into by the prologue, when used more
    /// than once.
    pub hoisted_slot: Option<u32>,
}

/// A reference from this unit to a nested unit of the session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NestedRef {
    /// Index into [`Session::units`].
    pub unit: usize,
    pub usage: u32,
    pub hoisted_slot: Option<u32>,
}

#[derive(Debug)]
pub(crate) struct LabelInfo {
    /// Emitter label, created on first use.
    pub bytecode: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TryRegion {
    pub contains_return: bool,
}

pub(crate) struct ClosureInfo<'s> {
    pub status: ClosureStatus,
    pub constants: ArenaVec<ConstantEntry, &'s Bump>,
    /// Variables captured from enclosing units, in first-reference order.
    /// This is also the order of the record's variable cells.
    pub non_passed: ArenaVec<Rc<ParameterExpr>, &'s Bump>,
    pub nested: ArenaVec<NestedRef, &'s Bump>,
    pub labels: ArenaMap<'s, LabelKey, LabelInfo>,
    /// Own variables captured by a nested unit; they live in shared cells.
    pub boxed: ArenaSet<'s, ParamKey>,
    pub try_regions: ArenaMap<'s, TryKey, TryRegion>,
    block_stack: ArenaVec<ParamKey, &'s Bump>,
    block_marks: ArenaVec<usize, &'s Bump>,
    try_stack: ArenaVec<(TryKey, TryRegion), &'s Bump>,
}

impl<'s> ClosureInfo<'s> {
    pub fn new(arena: &'s Bump, status: ClosureStatus) -> Self {
        Self {
            status,
            constants: ArenaVec::new_in(arena),
            non_passed: ArenaVec::new_in(arena),
            nested: ArenaVec::new_in(arena),
            labels: HashMap::new_in(arena),
            boxed: HashSet::new_in(arena),
            try_regions: HashMap::new_in(arena),
            block_stack: ArenaVec::new_in(arena),
            block_marks: ArenaVec::new_in(arena),
            try_stack: ArenaVec::new_in(arena),
        }
    }

    pub fn is_user_supplied(&self) -> bool {
        self.status.contains(ClosureStatus::USER_SUPPLIED)
    }

    // === Constants ===

    /// Registers a use of an identity constant. Repeated uses of the same
    /// object share one entry.
    pub fn add_constant(&mut self, value: &Value) {
        let Some(identity) = value.identity() else {
            return;
        };
        match self
            .constants
            .iter_mut()
            .find(|entry| entry.value.identity() == Some(identity))
        {
            Some(entry) => entry.usage += 1,
            None => self.constants.push(ConstantEntry {
                value: value.clone(),
                usage: 1,
                hoisted_slot: None,
            }),
        }
    }

    pub fn constant_index(&self, value: &Value) -> Option<usize> {
        let identity = value.identity()?;
        self.constants
            .iter()
            .position(|entry| entry.value.identity() == Some(identity))
    }

    // === Nested units ===

    pub fn add_nested(&mut self, unit: usize) {
        match self.nested.iter_mut().find(|nested| nested.unit == unit) {
            Some(nested) => nested.usage += 1,
            None => self.nested.push(NestedRef {
                unit,
                usage: 1,
                hoisted_slot: None,
            }),
        }
    }

    pub fn nested_position(&self, unit: usize) -> Option<usize> {
        self.nested.iter().position(|nested| nested.unit == unit)
    }

    /// Number of entries of the unit's closure record: constants first,
    /// then nested units.
    pub fn record_len(&self) -> usize {
        self.constants.len() + self.nested.len()
    }

    // === Variables ===

    pub fn add_non_passed(&mut self, param: &Rc<ParameterExpr>) {
        let key = ParamKey::of(param);
        if !self.non_passed.iter().any(|p| ParamKey::of(p) == key) {
            self.non_passed.push(param.clone());
        }
    }

    pub fn captured_index(&self, key: ParamKey) -> Option<usize> {
        self.non_passed.iter().position(|p| ParamKey::of(p) == key)
    }

    pub fn is_boxed(&self, key: ParamKey) -> bool {
        self.boxed.contains(&key)
    }

    pub fn push_block(&mut self, variables: &[Rc<ParameterExpr>]) {
        self.block_marks.push(self.block_stack.len());
        self.block_stack
            .extend(variables.iter().map(ParamKey::of));
    }

    pub fn pop_block(&mut self) {
        if let Some(mark) = self.block_marks.pop() {
            self.block_stack.truncate(mark);
        }
    }

    /// Whether `key` is a variable of an enclosing block of the unit.
    pub fn is_local(&self, key: ParamKey) -> bool {
        self.block_stack.contains(&key)
    }

    // === Labels and protected regions ===

    pub fn register_label(&mut self, target: &Rc<LabelTarget>) {
        self.labels
            .entry(LabelKey::of(target))
            .or_insert(LabelInfo { bytecode: None });
    }

    pub fn push_try(&mut self, key: TryKey) {
        self.try_stack.push((key, TryRegion::default()));
    }

    pub fn pop_try(&mut self) {
        if let Some((key, region)) = self.try_stack.pop() {
            self.try_regions.insert(key, region);
        }
    }

    /// Marks the innermost open region, if any, as containing a return jump.
    pub fn mark_return_in_try(&mut self) {
        if let Some((_, region)) = self.try_stack.last_mut() {
            region.contains_return = true;
        }
    }

    pub fn try_region(&self, key: TryKey) -> TryRegion {
        self.try_regions.get(&key).copied().unwrap_or_default()
    }
}

/// A nested lambda discovered during collection.
pub(crate) struct NestedLambdaInfo<'s> {
    pub lambda: Rc<LambdaExpr>,
    pub info: ClosureInfo<'s>,
    pub compiled: Option<CompiledUnit>,
    /// References to this lambda instance across the whole compilation.
    pub usage: u32,
}

/// Result of compiling a nested unit.
pub(crate) enum CompiledUnit {
    /// Captures nothing: a ready callable.
    Bound(Value),
    /// Captures variables: bound to a fresh record at every use.
    Open {
        unit: Value,
        captures: Vec<Rc<ParameterExpr>>,
    },
}

impl CompiledUnit {
    /// The value stored in the enclosing unit's closure record.
    pub fn record_value(&self) -> &Value {
        match self {
            CompiledUnit::Bound(value) | CompiledUnit::Open { unit: value, .. } => value,
        }
    }
}

/// State of one compile attempt.
pub(crate) struct Session<'s> {
    pub arena: &'s Bump,
    /// Nested units in discovery order, which is bottom-up: a unit comes after
    /// every unit nested in it.
    pub units: Vec<NestedLambdaInfo<'s>>,
    pub index: ArenaMap<'s, LambdaKey, usize>,
}

impl<'s> Session<'s> {
    pub fn new(arena: &'s Bump) -> Self {
        Self {
            arena,
            units: Vec::new(),
            index: HashMap::new_in(arena),
        }
    }

    pub fn unit_of(&self, lambda: &Rc<LambdaExpr>) -> Option<usize> {
        self.index.get(&LambdaKey::of(lambda)).copied()
    }
}
