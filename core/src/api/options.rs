//! Configuration options for compiling expression trees.

use crate::evaluator::ExecutionOptions;

/// Configuration options for [`compile`](super::compile).
///
/// # Example
///
/// ```
/// use vellum_core::api::CompilationOptions;
///
/// let options = CompilationOptions {
///     fallback: false,
///     ..CompilationOptions::default()
/// };
/// assert!(options.fast_path);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationOptions {
    /// Try the bytecode compiler first.
    ///
    /// Default: true
    pub fast_path: bool,

    /// Evaluate the tree when the compiler declines it (or when the fast path
    /// is off). With no fallback, such trees compile to `None`.
    ///
    /// Default: true
    pub fallback: bool,

    /// Maximum evaluation depth of the fallback evaluator.
    ///
    /// Default: 1000
    pub max_depth: usize,
}

impl CompilationOptions {
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            max_depth: self.max_depth,
        }
    }
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            fast_path: true,
            fallback: true,
            max_depth: ExecutionOptions::default().max_depth,
        }
    }
}
