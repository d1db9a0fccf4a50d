use alloc::boxed::Box;
use alloc::rc::Rc;

use hashbrown::HashSet;

use crate::{
    String, Vec,
    types::{MethodDef, Shape, Signature, StructDef, Type},
    values::Value,
    vm::Instruction,
};

/// What a protected region does when control leaves it.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    /// Entered when an exception matching `test` escapes the region. The
    /// exception is stored in `slot` before control moves to `target`.
    Catch { test: Type, slot: u32, target: u32 },
    /// Entered on every exit. The block spans `target..end`.
    Finally { target: u32, end: u32 },
    /// Entered only when an exception escapes. The block spans `target..end`.
    Fault { target: u32, end: u32 },
}

/// One entry of the exception table.
///
/// Entries are ordered innermost first; several catch entries of the same
/// `try` share a range and appear in source order.
#[derive(Debug, Clone)]
pub struct Handler {
    pub try_start: u32,
    pub try_end: u32,
    /// Operand stack depth on region entry; the stack is cut back to it before
    /// a handler runs.
    pub stack_depth: u32,
    pub kind: HandlerKind,
}

impl Handler {
    pub fn covers(&self, pc: usize) -> bool {
        (self.try_start as usize) <= pc && pc < (self.try_end as usize)
    }

    pub fn target(&self) -> u32 {
        match self.kind {
            HandlerKind::Catch { target, .. }
            | HandlerKind::Finally { target, .. }
            | HandlerKind::Fault { target, .. } => target,
        }
    }
}

/// A compiled unit: instructions plus the side tables they index.
pub struct Code {
    pub name: Option<String>,
    pub signature: Rc<Signature>,
    /// Entry shapes: one per parameter, preceded by `Shape::Record` when the
    /// unit is bound to a closure record.
    pub shapes: Box<[Shape]>,
    pub literals: Vec<Value>,
    pub types: Vec<Type>,
    pub methods: Vec<Rc<MethodDef>>,
    pub structs: Vec<Rc<StructDef>>,
    pub instructions: Vec<Instruction>,
    pub handlers: Vec<Handler>,
    pub num_params: usize,
    pub num_locals: usize,
    pub max_stack_size: usize,
}

impl core::fmt::Debug for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Code {{")?;
        if let Some(name) = &self.name {
            writeln!(f, "  name: {}", name)?;
        }
        writeln!(f, "  num_locals: {}", self.num_locals)?;
        writeln!(f, "  max_stack_size: {}", self.max_stack_size)?;

        if !self.literals.is_empty() {
            writeln!(f, "  literals: [")?;
            for (i, literal) in self.literals.iter().enumerate() {
                writeln!(f, "    [{}] = {:?}", i, literal)?;
            }
            writeln!(f, "  ]")?;
        } else {
            writeln!(f, "  literals: []")?;
        }

        // First pass: collect every address control can arrive at by a jump
        // or a handler, so they get labels.
        let mut jump_targets: HashSet<usize> = HashSet::new();
        for instr in &self.instructions {
            if let Some(target) = instr.jump_target() {
                jump_targets.insert(target as usize);
            }
        }
        for handler in &self.handlers {
            jump_targets.insert(handler.target() as usize);
        }

        let mut sorted_targets: Vec<_> = jump_targets.into_iter().collect();
        sorted_targets.sort();
        let label_map: hashbrown::HashMap<usize, usize> = sorted_targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();
        let label_of = |addr: usize| {
            label_map
                .get(&addr)
                .map(|l| alloc::format!("L{}", l))
                .unwrap_or_else(|| alloc::format!("@{}", addr))
        };

        writeln!(f, "  instructions:")?;
        for (addr, instr) in self.instructions.iter().enumerate() {
            let label_prefix = if let Some(&label_num) = label_map.get(&addr) {
                alloc::format!("L{}:", label_num)
            } else {
                String::new()
            };

            if let Some(target) = instr.jump_target() {
                writeln!(
                    f,
                    "    {:4} {:>4}  {:?} (to {})",
                    addr,
                    label_prefix,
                    instr,
                    label_of(target as usize)
                )?;
            } else {
                writeln!(f, "    {:4} {:>4}  {:?}", addr, label_prefix, instr)?;
            }
        }

        if !self.handlers.is_empty() {
            writeln!(f, "  handlers:")?;
            for handler in &self.handlers {
                let kind = match &handler.kind {
                    HandlerKind::Catch { test, slot, .. } => {
                        alloc::format!("catch {} -> local {}", test, slot)
                    }
                    HandlerKind::Finally { .. } => String::from("finally"),
                    HandlerKind::Fault { .. } => String::from("fault"),
                };
                writeln!(
                    f,
                    "    [{}, {}) depth {} {} at {}",
                    handler.try_start,
                    handler.try_end,
                    handler.stack_depth,
                    kind,
                    label_of(handler.target() as usize)
                )?;
            }
        }

        write!(f, "}}")
    }
}
