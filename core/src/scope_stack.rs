//! Scope stack for variable bindings.
//!
//! Bindings are keyed by variable identity rather than by name, so shadowing
//! a variable with another of the same name needs no special handling. A
//! scope is a run of bindings on top of the stack; lookups search from the
//! innermost binding outwards.

use alloc::vec::Vec;
use core::fmt;

pub struct ScopeStack<K, T> {
    bindings: Vec<(K, T)>,
    /// Start of every open scope in `bindings`.
    scopes: Vec<usize>,
}

impl<K: Copy + Eq, T> ScopeStack<K, T> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// A stack whose outermost scope holds `bindings`.
    pub fn from_bindings(bindings: Vec<(K, T)>) -> Self {
        Self {
            bindings,
            scopes: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(self.bindings.len());
    }

    /// Drops every binding of the innermost scope.
    pub fn pop_scope(&mut self) -> Result<(), PopError> {
        let start = self.scopes.pop().ok_or(PopError)?;
        self.bindings.truncate(start);
        Ok(())
    }

    /// Binds `key` in the innermost scope, shadowing outer bindings.
    pub fn bind(&mut self, key: K, value: T) {
        self.bindings.push((key, value));
    }

    pub fn lookup(&self, key: &K) -> Option<&T> {
        self.bindings
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Every visible binding, outermost first. Shadowed bindings are
    /// included; later entries win.
    pub fn bindings(&self) -> &[(K, T)] {
        &self.bindings
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl<K: Copy + Eq, T> Default for ScopeStack<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Popping a scope from a stack with no open scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopError;

impl fmt::Display for PopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot pop from empty scope stack")
    }
}

impl core::error::Error for PopError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inner_binding_shadows_outer() {
        let mut stack = ScopeStack::from_bindings(alloc::vec![(1, "outer")]);
        stack.push_scope();
        stack.bind(1, "inner");
        assert_eq!(stack.lookup(&1), Some(&"inner"));
        stack.pop_scope().unwrap();
        assert_eq!(stack.lookup(&1), Some(&"outer"));
    }

    #[test]
    fn test_pop_drops_scope_bindings() {
        let mut stack = ScopeStack::new();
        stack.push_scope();
        stack.bind(7, 1.5);
        assert_eq!(stack.depth(), 1);
        stack.pop_scope().unwrap();
        assert_eq!(stack.lookup(&7), None);
        assert_eq!(stack.pop_scope(), Err(PopError));
    }
}
