use crate::Vec;
use smallvec::SmallVec;

/// Operand stack of a VM frame.
///
/// The compiler computes the exact maximum depth of every unit; exceeding it
/// is a compiler bug, checked in debug builds only.
pub struct Stack<T> {
    items: Vec<T>,
    max_size: usize,
}

impl<T> Stack<T> {
    pub fn new(max_size: usize) -> Self {
        // Pre-allocate a reasonable amount (min of max_size or 256)
        let initial_capacity = max_size.min(256);

        Self {
            items: Vec::with_capacity(initial_capacity),
            max_size,
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        debug_assert!(
            self.items.len() < self.max_size,
            "Stack overflow: attempted to push beyond maximum size of {}",
            self.max_size
        );
        self.items.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    /// Removes the top `n` values, preserving their push order.
    pub fn pop_n<const N: usize>(&mut self, n: usize) -> Option<SmallVec<[T; N]>> {
        let start = self.items.len().checked_sub(n)?;
        Some(self.items.drain(start..).collect())
    }

    /// Cuts the stack back to `len` values, as when a handler takes over.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.items.iter().rev()).finish()
    }
}
