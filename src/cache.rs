//! Object caches keyed by plugin type and instance.
//!
//! Each key owns a `OnceCell`, obtained under a short map lock. The lock is
//! released before the value is built, so builders never block unrelated
//! keys, and concurrent first requests for the same key build once.

use std::any::TypeId;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::compiler::Built;
use crate::error::{ContainerError, ContainerResult};
use crate::instance::InstanceId;
use crate::internal::{panic_message, FastMap};
use crate::plugin_type::Object;
use crate::traits::Dispose;

/// Cache key: the plugin type requested plus the instance that satisfied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub plugin: TypeId,
    pub instance: InstanceId,
}

impl CacheKey {
    pub fn new(plugin: TypeId, instance: InstanceId) -> Self {
        Self { plugin, instance }
    }
}

struct CachedObject {
    object: Object,
    disposable: Option<Arc<dyn Dispose>>,
    description: Arc<str>,
    sequence: u64,
    disposed: AtomicBool,
}

/// A store of built values for one lifecycle scope.
///
/// Once [`dispose_all`](Self::dispose_all) has run the cache is closed: new
/// requests fail with [`ContainerError::Disposed`], and a value whose build
/// was still running is disposed as soon as it completes.
pub struct ObjectCache {
    label: &'static str,
    entries: Mutex<FastMap<CacheKey, Arc<OnceCell<CachedObject>>>>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl ObjectCache {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Mutex::new(FastMap::default()),
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Returns the cached value for `key`, building it with `build` if absent.
    ///
    /// A failed build leaves the key empty so a later request retries.
    pub fn get_or_build<F>(&self, key: CacheKey, description: &Arc<str>, build: F) -> ContainerResult<Object>
    where
        F: FnOnce() -> ContainerResult<Built>,
    {
        let cell = {
            let mut entries = self.entries.lock();
            if self.is_closed() {
                return Err(ContainerError::Disposed);
            }
            entries.entry(key).or_default().clone()
        };

        if let Some(cached) = cell.get() {
            tracing::trace!(cache = self.label, instance = %cached.description, "cache hit");
            return Ok(cached.object.clone());
        }

        let cached = cell.get_or_try_init(|| {
            let built = build()?;
            tracing::trace!(cache = self.label, instance = %description, "cached new value");
            Ok::<_, ContainerError>(CachedObject {
                object: built.object,
                disposable: built.disposable,
                description: description.clone(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                disposed: AtomicBool::new(false),
            })
        })?;

        // Closed while building: the drain may have missed this value
        let closed = {
            let _entries = self.entries.lock();
            self.is_closed()
        };
        if closed {
            let mut report = DisposalReport::default();
            dispose_cached(cached, &mut report);
            return Err(ContainerError::Disposed);
        }
        Ok(cached.object.clone())
    }

    /// Whether a built value is cached for `key`.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .map_or(false, |cell| cell.get().is_some())
    }

    /// Number of built values in the cache.
    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `key` and disposes its value. A value still being built is
    /// left in place and cached when its build completes.
    pub fn eject(&self, key: &CacheKey, report: &mut DisposalReport) {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(cell) if cell.get().is_some() => entries.remove(key),
                _ => None,
            }
        };
        if let Some(cached) = removed.as_deref().and_then(OnceCell::get) {
            tracing::debug!(cache = self.label, instance = %cached.description, "ejected");
            dispose_cached(cached, report);
        }
    }

    /// Empties the cache and disposes every value, most recently built first.
    pub fn dispose_all(&self) -> DisposalReport {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            self.closed.store(true, Ordering::Release);
            entries.drain().map(|(_, cell)| cell).collect()
        };
        let mut cached: Vec<&CachedObject> = drained.iter().filter_map(|cell| cell.get()).collect();
        cached.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        let mut report = DisposalReport::default();
        for entry in cached {
            dispose_cached(entry, &mut report);
        }
        if report.disposed > 0 || !report.failures.is_empty() {
            tracing::debug!(
                cache = self.label,
                disposed = report.disposed,
                failures = report.failures.len(),
                "cache disposed"
            );
        }
        report
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("label", &self.label)
            .field("entries", &self.len())
            .finish()
    }
}

/// Disposes `cached` unless it already was.
fn dispose_cached(cached: &CachedObject, report: &mut DisposalReport) {
    let Some(disposable) = &cached.disposable else {
        return;
    };
    if cached.disposed.swap(true, Ordering::AcqRel) {
        return;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| disposable.dispose())) {
        Ok(()) => report.disposed += 1,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(instance = %cached.description, error = %message, "disposal failed");
            report.failures.push(DisposalFailure {
                instance: cached.description.to_string(),
                message,
            });
        }
    }
}

/// Outcome of disposing one or more caches.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisposalReport {
    /// Values whose `dispose` completed.
    pub disposed: usize,
    /// Values whose `dispose` panicked.
    pub failures: Vec<DisposalFailure>,
}

impl DisposalReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: DisposalReport) {
        self.disposed += other.disposed;
        self.failures.extend(other.failures);
    }
}

/// A disposer that panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalFailure {
    pub instance: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_type::wrap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    struct Tracked(Arc<AtomicUsize>);

    impl Dispose for Tracked {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Exploding;

    impl Dispose for Exploding {
        fn dispose(&self) {
            panic!("flush failed");
        }
    }

    fn key(n: u64) -> CacheKey {
        CacheKey::new(TypeId::of::<u8>(), InstanceId::from_raw(n))
    }

    fn built(disposable: Option<Arc<dyn Dispose>>) -> Built {
        Built {
            object: wrap(Arc::new(1u8)),
            disposable,
        }
    }

    #[test]
    fn builds_once_per_key() {
        let cache = ObjectCache::new("test");
        let calls = AtomicUsize::new(0);
        let description: Arc<str> = Arc::from("u8");
        for _ in 0..3 {
            cache
                .get_or_build(key(1), &description, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(built(None))
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.has(&key(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_build_leaves_key_empty() {
        let cache = ObjectCache::new("test");
        let description: Arc<str> = Arc::from("u8");
        let result = cache.get_or_build(key(1), &description, || Err(crate::ContainerError::Disposed));
        assert!(result.is_err());
        assert!(!cache.has(&key(1)));
        assert!(cache.get_or_build(key(1), &description, || Ok(built(None))).is_ok());
    }

    #[test]
    fn dispose_all_continues_past_failures() {
        let cache = ObjectCache::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let description: Arc<str> = Arc::from("u8");
        cache
            .get_or_build(key(1), &description, || Ok(built(Some(Arc::new(Tracked(count.clone()))))))
            .unwrap();
        cache
            .get_or_build(key(2), &description, || Ok(built(Some(Arc::new(Exploding)))))
            .unwrap();
        cache
            .get_or_build(key(3), &description, || Ok(built(Some(Arc::new(Tracked(count.clone()))))))
            .unwrap();

        let report = cache.dispose_all();
        assert_eq!(report.disposed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].message, "flush failed");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.dispose_all(), DisposalReport::default());
    }

    /// Runs a build of `key(1)` on another thread and calls `during` while
    /// that build is blocked.
    fn interrupt_build(
        cache: &ObjectCache,
        count: &Arc<AtomicUsize>,
        during: impl FnOnce(&ObjectCache),
    ) -> ContainerResult<Object> {
        let description: Arc<str> = Arc::from("u8");
        let (started_tx, started_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        thread::scope(|s| {
            let (description, count) = (&description, count.clone());
            let building = s.spawn(move || {
                cache.get_or_build(key(1), description, move || {
                    started_tx.send(()).unwrap();
                    go_rx.recv().unwrap();
                    Ok(built(Some(Arc::new(Tracked(count)))))
                })
            });
            started_rx.recv().unwrap();
            during(cache);
            go_tx.send(()).unwrap();
            building.join().unwrap()
        })
    }

    #[test]
    fn value_finished_after_dispose_all_is_disposed() {
        let cache = ObjectCache::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let result = interrupt_build(&cache, &count, |cache| {
            assert_eq!(cache.dispose_all().disposed, 0);
        });

        assert!(matches!(result, Err(ContainerError::Disposed)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(cache.is_closed());
        let description: Arc<str> = Arc::from("u8");
        assert!(matches!(
            cache.get_or_build(key(2), &description, || Ok(built(None))),
            Err(ContainerError::Disposed)
        ));
    }

    #[test]
    fn eject_leaves_a_value_still_being_built() {
        let cache = ObjectCache::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let result = interrupt_build(&cache, &count, |cache| {
            let mut report = DisposalReport::default();
            cache.eject(&key(1), &mut report);
            assert_eq!(report.disposed, 0);
        });

        assert!(result.is_ok());
        assert!(cache.has(&key(1)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(cache.dispose_all().disposed, 1);
    }

    #[test]
    fn eject_disposes_only_the_key() {
        let cache = ObjectCache::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let description: Arc<str> = Arc::from("u8");
        for n in 1..=2 {
            cache
                .get_or_build(key(n), &description, || Ok(built(Some(Arc::new(Tracked(count.clone()))))))
                .unwrap();
        }
        let mut report = DisposalReport::default();
        cache.eject(&key(1), &mut report);
        assert_eq!(report.disposed, 1);
        assert!(!cache.has(&key(1)));
        assert!(cache.has(&key(2)));
    }
}
