//! Disposal trait for resource cleanup.

/// Trait for synchronous resource disposal.
///
/// Implement this trait for services that need structured teardown (flushing
/// buffers, closing connections) and declare it from
/// [`Pluggable::describe`](crate::Pluggable::describe) with
/// [`Describe::disposable`](crate::Describe::disposable). Cached values are
/// disposed when their container, context, or cache entry goes away, most
/// recently built first.
///
/// # Examples
///
/// ```
/// use structuremap::{Describe, Dispose, Pluggable, Registry, Resolver};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// static FLUSHED: AtomicBool = AtomicBool::new(false);
///
/// struct Journal;
///
/// impl Dispose for Journal {
///     fn dispose(&self) {
///         FLUSHED.store(true, Ordering::SeqCst);
///     }
/// }
///
/// impl Pluggable for Journal {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|_| Ok(Journal));
///         d.disposable();
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.for_type::<Journal>().singleton().use_type::<Journal>();
/// let container = registry.build();
/// container.get_instance::<Journal>().unwrap();
///
/// let report = container.dispose();
/// assert_eq!(report.disposed, 1);
/// assert!(FLUSHED.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}
