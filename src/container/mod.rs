//! The container: resolution entry point and owner of the object caches.

mod nested;
mod session;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

pub use nested::ContextKey;
pub use session::BuildSession;

use crate::cache::{CacheKey, DisposalReport, ObjectCache};
use crate::config::ContainerConfig;
use crate::diagnostics::GraphReport;
use crate::error::{ContainerError, ContainerResult, Problem};
use crate::graph::{PluginFamily, PluginGraph};
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;
use crate::plugin_type::{Object, PluginType};
use crate::traits::{Resolver, ResolverCore};

/// Caches owned by the root container and shared with every nested one.
struct SharedCaches {
    singletons: Arc<ObjectCache>,
    threads: Mutex<HashMap<ThreadId, Arc<ObjectCache>>>,
    contexts: Mutex<HashMap<ContextKey, Arc<ObjectCache>>>,
    disposed: AtomicBool,
}

struct ContainerInner {
    graph: Arc<PluginGraph>,
    root: Option<Arc<ContainerInner>>,
    shared: Arc<SharedCaches>,
    scoped: Arc<ObjectCache>,
    transients: Option<Arc<ObjectCache>>,
    is_root: bool,
    disposed: AtomicBool,
}

/// Resolves instances from a [`PluginGraph`] and owns their caches.
///
/// `Container` is a cheap handle; clones share the same caches. Nested
/// containers created with [`get_nested_container`](Self::get_nested_container)
/// share the graph and the root-owned caches but get fresh transient and
/// container-scoped caches.
///
/// # Examples
///
/// ```rust
/// use structuremap::{Describe, Pluggable, Registry, Resolver};
/// use std::sync::Arc;
///
/// struct Clock;
/// impl Pluggable for Clock {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|_| Ok(Clock));
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.for_type::<Clock>().singleton().use_type::<Clock>();
/// let container = registry.build();
///
/// let a = container.get_instance::<Clock>().unwrap();
/// let b = container.get_nested_container().get_instance::<Clock>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
    context: Option<ContextKey>,
}

impl Container {
    pub(crate) fn new(graph: Arc<PluginGraph>) -> Self {
        tracing::debug!(families = graph.families().len(), "container built");
        let shared = Arc::new(SharedCaches {
            singletons: Arc::new(ObjectCache::new("singleton")),
            threads: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        });
        Self {
            inner: Arc::new(ContainerInner {
                graph,
                root: None,
                shared,
                scoped: Arc::new(ObjectCache::new("container")),
                transients: None,
                is_root: true,
                disposed: AtomicBool::new(false),
            }),
            context: None,
        }
    }

    /// A nested container over `graph`, sharing this container's root caches.
    pub(crate) fn nested_over(&self, graph: Arc<PluginGraph>) -> Self {
        let transients = graph
            .config()
            .cache_nested_transients
            .then(|| Arc::new(ObjectCache::new("nested transient")));
        Self {
            inner: Arc::new(ContainerInner {
                graph,
                root: Some(self.inner.root.clone().unwrap_or_else(|| self.inner.clone())),
                shared: self.inner.shared.clone(),
                scoped: Arc::new(ObjectCache::new("container")),
                transients,
                is_root: false,
                disposed: AtomicBool::new(false),
            }),
            context: self.context,
        }
    }

    pub fn graph(&self) -> &Arc<PluginGraph> {
        &self.inner.graph
    }

    pub fn config(&self) -> &ContainerConfig {
        self.inner.graph.config()
    }

    /// Whether this is the root container rather than a nested one.
    pub fn is_root(&self) -> bool {
        self.inner.is_root
    }

    /// The root container, bound to this handle's context.
    pub fn root(&self) -> Container {
        Container {
            inner: self.inner.root.clone().unwrap_or_else(|| self.inner.clone()),
            context: self.context,
        }
    }

    /// The context this handle resolves context-scoped instances in.
    pub fn context(&self) -> Option<ContextKey> {
        self.context
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire) || self.inner.shared.disposed.load(Ordering::Acquire)
    }

    fn session(&self) -> ContainerResult<BuildSession<'_>> {
        if self.is_disposed() {
            return Err(ContainerError::Disposed);
        }
        Ok(BuildSession::new(self))
    }

    pub(crate) fn transient_cache(&self) -> Option<&Arc<ObjectCache>> {
        self.inner.transients.as_ref()
    }

    pub(crate) fn singleton_cache(&self) -> &Arc<ObjectCache> {
        &self.inner.shared.singletons
    }

    pub(crate) fn scoped_cache(&self) -> &Arc<ObjectCache> {
        &self.inner.scoped
    }

    /// The calling thread's cache, created on first use.
    pub(crate) fn thread_cache(&self) -> Arc<ObjectCache> {
        self.inner
            .shared
            .threads
            .lock()
            .entry(thread::current().id())
            .or_insert_with(|| Arc::new(ObjectCache::new("thread")))
            .clone()
    }

    pub(crate) fn all_thread_caches(&self) -> Vec<Arc<ObjectCache>> {
        self.inner.shared.threads.lock().values().cloned().collect()
    }

    /// The active context's cache, or `None` outside a context.
    pub(crate) fn context_cache(&self) -> Option<Arc<ObjectCache>> {
        let key = self.context?;
        Some(
            self.inner
                .shared
                .contexts
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::new(ObjectCache::new("context")))
                .clone(),
        )
    }

    pub(crate) fn all_context_caches(&self) -> Vec<Arc<ObjectCache>> {
        self.inner.shared.contexts.lock().values().cloned().collect()
    }

    pub(crate) fn remove_context_cache(&self, key: ContextKey) -> Option<Arc<ObjectCache>> {
        self.inner.shared.contexts.lock().remove(&key)
    }

    /// Removes the instance of `T` named `name` from every cache this
    /// container owns and disposes it.
    ///
    /// On the root container that includes the shared singleton,
    /// thread-local and context caches. A nested container only evicts its
    /// own transient and container-scoped caches.
    pub fn eject<T: ?Sized + 'static>(&self, name: &str) -> DisposalReport {
        let mut report = DisposalReport::default();
        let Some(family) = self.inner.graph.existing_family(TypeId::of::<T>()) else {
            return report;
        };
        if let Ok(instance) = family.find_instance(Some(name), &[]) {
            self.eject_instance(&family, &instance, &mut report);
        }
        report
    }

    /// Ejects every instance of `T`. On the root container the family itself
    /// is removed, so later requests go through the missing-family policies
    /// again.
    pub fn eject_all_instances_of<T: ?Sized + 'static>(&self) -> DisposalReport {
        let mut report = DisposalReport::default();
        let id = TypeId::of::<T>();
        let Some(family) = self.inner.graph.existing_family(id) else {
            return report;
        };
        for instance in family.instances().iter().chain(family.synthesized_instances().iter()) {
            self.eject_instance(&family, instance, &mut report);
        }
        if self.is_root() {
            self.inner.graph.remove_family(id);
        }
        tracing::debug!(
            plugin_type = family.plugin_type().name(),
            disposed = report.disposed,
            "ejected all instances"
        );
        report
    }

    fn eject_instance(&self, family: &PluginFamily, instance: &Arc<Instance>, report: &mut DisposalReport) {
        let key = CacheKey::new(family.plugin_type().id(), instance.id());
        for lifecycle in Lifecycle::ALL {
            lifecycle.scope().eject(self, &key, report);
        }
    }

    /// Disposes this container's caches, most recently built first.
    ///
    /// The root container disposes every cache: context, thread-local,
    /// container-scoped and singleton. A nested container disposes only its
    /// own transient and container-scoped caches. Calling `dispose` again
    /// returns an empty report. A disposed container refuses to resolve.
    pub fn dispose(&self) -> DisposalReport {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return DisposalReport::default();
        }
        let report = self.inner.dispose_caches();
        if !report.is_clean() {
            tracing::warn!(failures = report.failures.len(), "container disposed with failures");
        }
        report
    }

    /// Describes every family and instance without building anything.
    pub fn model(&self) -> GraphReport {
        GraphReport::build(&self.inner.graph)
    }

    /// Compiles every registered instance and fails with all configuration
    /// problems found.
    pub fn assert_configuration_is_valid(&self) -> ContainerResult<()> {
        let graph = &self.inner.graph;
        let problems: Vec<Problem> = graph
            .families()
            .iter()
            .flat_map(|family| {
                family
                    .instances()
                    .iter()
                    .flat_map(|instance| graph.plan_for(family, instance).problems())
                    .collect::<Vec<_>>()
            })
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::ConfigurationProblem(problems))
        }
    }
}

impl ContainerInner {
    fn dispose_caches(&self) -> DisposalReport {
        let mut report = DisposalReport::default();
        if let Some(transients) = &self.transients {
            report.absorb(transients.dispose_all());
        }
        report.absorb(self.scoped.dispose_all());

        if self.is_root {
            self.shared.disposed.store(true, Ordering::Release);
            let contexts: Vec<_> = self.shared.contexts.lock().drain().map(|(_, cache)| cache).collect();
            for cache in contexts {
                report.absorb(cache.dispose_all());
            }
            let threads: Vec<_> = self.shared.threads.lock().drain().map(|(_, cache)| cache).collect();
            for cache in threads {
                report.absorb(cache.dispose_all());
            }
            report.absorb(self.shared.singletons.dispose_all());
        }
        tracing::debug!(
            root = self.is_root,
            disposed = report.disposed,
            failures = report.failures.len(),
            "container disposed"
        );
        report
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self.is_root {
            if !self.shared.singletons.is_empty() {
                tracing::debug!("root container dropped without dispose");
            }
        } else {
            self.dispose_caches();
        }
    }
}

impl ResolverCore for Container {
    fn resolve_object(&self, plugin_type: &PluginType, name: Option<&str>) -> ContainerResult<Object> {
        self.session()?.resolve_object(plugin_type, name)
    }

    fn try_resolve_object(&self, plugin_type: &PluginType, name: Option<&str>) -> ContainerResult<Option<Object>> {
        self.session()?.try_resolve_object(plugin_type, name)
    }

    fn resolve_all_objects(&self, plugin_type: &PluginType) -> ContainerResult<Vec<Object>> {
        self.session()?.resolve_all_objects(plugin_type)
    }
}

impl Resolver for Container {}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("root", &self.inner.is_root)
            .field("context", &self.context)
            .field("disposed", &self.is_disposed())
            .field("graph", &self.inner.graph)
            .finish()
    }
}
