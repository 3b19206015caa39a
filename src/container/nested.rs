//! Nested containers and context handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::DisposalReport;
use crate::registry::Registry;

use super::Container;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifies one context, such as a request or a unit of work.
///
/// Context-scoped instances are cached per key. Keys from [`ContextKey::new`]
/// are unique within the process; keys converted from a `u64` are whatever
/// the caller chooses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey(u64);

impl ContextKey {
    pub fn new() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ContextKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for ContextKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

impl Container {
    /// Creates a nested container.
    ///
    /// The nested container resolves from the same families and shares the
    /// singleton, thread-local and context caches. Transient and
    /// container-scoped values are cached per nested container and disposed
    /// with it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use structuremap::{Describe, Pluggable, Registry, Resolver};
    /// use std::sync::Arc;
    ///
    /// struct UnitOfWork;
    /// impl Pluggable for UnitOfWork {
    ///     fn describe(d: &mut Describe<Self>) {
    ///         d.constructor(|_| Ok(UnitOfWork));
    ///     }
    /// }
    ///
    /// let container = Registry::new().build();
    /// let first = container.get_nested_container();
    /// let second = container.get_nested_container();
    ///
    /// let a = first.get_concrete::<UnitOfWork>().unwrap();
    /// let b = first.get_concrete::<UnitOfWork>().unwrap();
    /// let c = second.get_concrete::<UnitOfWork>().unwrap();
    /// assert!(Arc::ptr_eq(&a, &b));
    /// assert!(!Arc::ptr_eq(&a, &c));
    /// ```
    pub fn get_nested_container(&self) -> Container {
        self.nested_over(self.graph().clone())
    }

    /// Creates a nested container with registrations of its own.
    ///
    /// Families registered in `configure` hide the enclosing container's
    /// families for the same plugin type, for this nested container and any
    /// container nested inside it.
    pub fn get_nested_container_with<F>(&self, configure: F) -> Container
    where
        F: FnOnce(&mut Registry),
    {
        let mut registry = Registry::new();
        configure(&mut registry);
        let graph = registry.build_graph(Some(self.graph().clone()));
        tracing::debug!(families = graph.families().len(), "nested container with registrations");
        self.nested_over(Arc::new(graph))
    }

    /// A handle that resolves context-scoped instances in `key`.
    ///
    /// The handle shares every cache with `self`; only the active context
    /// differs.
    pub fn with_context(&self, key: ContextKey) -> Container {
        Container {
            inner: self.inner.clone(),
            context: Some(key),
        }
    }

    /// Disposes the values cached for `key`.
    ///
    /// A handle still bound to `key` starts a fresh cache if used again.
    pub fn end_context(&self, key: ContextKey) -> DisposalReport {
        match self.remove_context_cache(key) {
            Some(cache) => {
                let report = cache.dispose_all();
                tracing::debug!(context = %key, disposed = report.disposed, "context ended");
                report
            }
            None => DisposalReport::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_context_keys_are_unique() {
        let a = ContextKey::new();
        let b = ContextKey::new();
        assert_ne!(a, b);
        assert_eq!(ContextKey::from(7).as_u64(), 7);
    }

    #[test]
    fn context_handles_share_the_container() {
        let container = Registry::new().build();
        let key = ContextKey::new();
        let handle = container.with_context(key);
        assert_eq!(handle.context(), Some(key));
        assert!(container.context().is_none());
        assert!(handle.context_cache().is_some());
        assert!(container.context_cache().is_none());
        assert_eq!(container.all_context_caches().len(), 1);
        assert!(container.end_context(key).is_clean());
        assert!(container.all_context_caches().is_empty());
    }
}
