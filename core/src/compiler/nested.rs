//! Nested-unit compilation.
//!
//! Every lambda nested in the compiled tree becomes its own unit. Units are
//! compiled in discovery order, which the collector guarantees is bottom-up,
//! so a unit's own nested units are ready when its record is assembled.

use alloc::rc::Rc;
use core::mem;

use tracing::trace;

use super::closure_info::{ClosureInfo, ClosureStatus, CompiledUnit, Session};
use super::emitter::Emitter;
use super::error::{CompileError, PassResult};
use crate::{
    ToString, Vec,
    values::Value,
    vm::{BytecodeClosure, ClosureRecord, OpenUnit},
};

/// Compiles every nested unit of the session, innermost first.
pub(crate) fn compile_nested_units(session: &mut Session<'_>) -> PassResult {
    for unit in 0..session.units.len() {
        let empty = ClosureInfo::new(session.arena, ClosureStatus::empty());
        let mut info = mem::replace(&mut session.units[unit].info, empty);
        let lambda = session.units[unit].lambda.clone();

        let emitted = Emitter::new(&*session, &mut info, &lambda, None)
            .compile()
            .and_then(|code| Ok((code, record_values(session, &info)?)));
        let captures: Vec<_> = info.non_passed.iter().cloned().collect();
        // Restored before any error propagates.
        session.units[unit].info = info;
        let (code, values) = emitted?;
        let code = Rc::new(code);

        let compiled = if captures.is_empty() {
            let record = ClosureRecord::from_constants(values);
            CompiledUnit::Bound(Value::Function(Rc::new(BytecodeClosure::new(code, record))))
        } else {
            CompiledUnit::Open {
                unit: Value::OpenUnit(Rc::new(OpenUnit::new(code, values))),
                captures,
            }
        };
        trace!(
            unit,
            name = lambda.display_name(),
            open = matches!(compiled, CompiledUnit::Open { .. }),
            "Compiled nested unit"
        );
        session.units[unit].compiled = Some(compiled);
    }
    Ok(())
}

/// Values of a unit's closure record: its identity constants, then the
/// compiled form of every nested unit it references.
pub(crate) fn record_values(session: &Session<'_>, info: &ClosureInfo<'_>) -> PassResult<Vec<Value>> {
    let mut values = Vec::with_capacity(info.record_len());
    values.extend(info.constants.iter().map(|entry| entry.value.clone()));
    for nested in &info.nested {
        let unit = &session.units[nested.unit];
        let compiled = unit
            .compiled
            .as_ref()
            .ok_or_else(|| CompileError::UnresolvedNestedUnit {
                name: unit.lambda.display_name().to_string(),
            })?;
        values.push(compiled.record_value().clone());
    }
    Ok(values)
}
