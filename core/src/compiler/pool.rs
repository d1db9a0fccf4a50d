//! Reusable scratch buffers for signature shapes.
//!
//! Every compiled unit computes the shapes of its entry signature. The
//! buffers they are assembled in are recycled through a small fixed pool,
//! one slot per parameter count, shared by every thread compiling at the
//! same time. A buffer is claimed with an atomic swap and given back with a
//! compare-exchange; when the slot is empty (or taken by another thread) a
//! fresh buffer is allocated instead.

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::{
    Box, Vec,
    types::{Shape, Signature},
};

const POOL_SLOTS: usize = 8;

static SHAPE_POOL: [AtomicPtr<Vec<Shape>>; POOL_SLOTS] =
    [const { AtomicPtr::new(ptr::null_mut()) }; POOL_SLOTS];

/// A claimed shape buffer, returned to the pool on drop.
pub(crate) struct ShapeBuffer {
    buffer: ManuallyDrop<Box<Vec<Shape>>>,
    param_count: usize,
}

/// Claims the pooled buffer for signatures with `param_count` parameters.
pub(crate) fn take(param_count: usize) -> ShapeBuffer {
    let pooled = SHAPE_POOL
        .get(param_count)
        .map(|slot| slot.swap(ptr::null_mut(), Ordering::AcqRel))
        .filter(|raw| !raw.is_null())
        // SAFETY: non-null pool entries come from `Box::into_raw` in `drop`,
        // and the swap gives this thread sole ownership.
        .map(|raw| unsafe { Box::from_raw(raw) });
    let buffer = pooled.unwrap_or_else(|| Box::new(Vec::with_capacity(param_count + 1)));
    ShapeBuffer {
        buffer: ManuallyDrop::new(buffer),
        param_count,
    }
}

impl Deref for ShapeBuffer {
    type Target = Vec<Shape>;

    fn deref(&self) -> &Vec<Shape> {
        &self.buffer
    }
}

impl DerefMut for ShapeBuffer {
    fn deref_mut(&mut self) -> &mut Vec<Shape> {
        &mut self.buffer
    }
}

impl Drop for ShapeBuffer {
    fn drop(&mut self) {
        // SAFETY: `drop` runs once and the field is not touched afterwards.
        let mut buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        let Some(slot) = SHAPE_POOL.get(self.param_count) else {
            return;
        };
        buffer.clear();
        let raw = Box::into_raw(buffer);
        if slot
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // SAFETY: `raw` was never published.
            drop(unsafe { Box::from_raw(raw) });
        }
    }
}

/// Entry shapes of a unit: a leading `Record` slot when the unit is bound to
/// a closure record, then one shape per parameter.
pub(crate) fn signature_shapes(signature: &Signature, has_record: bool) -> Box<[Shape]> {
    let mut buffer = take(signature.params.len());
    if has_record {
        buffer.push(Shape::Record);
    }
    buffer.extend(signature.params.iter().map(Shape::of));
    buffer.as_slice().into()
}
