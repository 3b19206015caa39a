//! Lifecycles decide which object cache, if any, holds a built instance.

use std::fmt;
use std::sync::Arc;

use crate::cache::{CacheKey, DisposalReport, ObjectCache};
use crate::config::HybridScope;
use crate::container::Container;
use crate::error::BuildFailure;
use crate::plugin_type::PluginType;

/// How long a built instance lives.
///
/// # Examples
///
/// ```rust
/// use structuremap::Lifecycle;
///
/// assert_eq!(Lifecycle::default(), Lifecycle::Transient);
/// assert_eq!(Lifecycle::Hybrid.to_string(), "Hybrid");
/// assert_eq!(Lifecycle::Singleton.scope().description(), "Singleton");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Lifecycle {
    /// A new value per request. Inside a nested container, one value per
    /// nested container.
    #[default]
    Transient,
    /// One value for the root container and all nested containers.
    Singleton,
    /// One value per OS thread.
    ThreadLocal,
    /// One value per active context key.
    Context,
    /// Context when one is active, otherwise thread-local.
    Hybrid,
    /// One value per container, root or nested.
    ContainerScoped,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 6] = [
        Lifecycle::Transient,
        Lifecycle::Singleton,
        Lifecycle::ThreadLocal,
        Lifecycle::Context,
        Lifecycle::Hybrid,
        Lifecycle::ContainerScoped,
    ];

    /// The cache-selection strategy for this lifecycle.
    pub fn scope(self) -> &'static dyn LifecycleScope {
        match self {
            Lifecycle::Transient => &TransientScope,
            Lifecycle::Singleton => &SingletonScope,
            Lifecycle::ThreadLocal => &ThreadLocalScope,
            Lifecycle::Context => &ContextScope,
            Lifecycle::Hybrid => &HybridScopeSelector,
            Lifecycle::ContainerScoped => &ContainerScope,
        }
    }

    pub fn description(self) -> &'static str {
        self.scope().description()
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Maps a lifecycle onto the caches of a container.
///
/// `find_cache` returns `Ok(None)` when built values are not cached at all.
pub trait LifecycleScope: Send + Sync {
    fn find_cache(
        &self,
        container: &Container,
        plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure>;

    /// Removes and disposes the cached value for `key` from every cache this
    /// lifecycle uses that `container` owns.
    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport);

    fn description(&self) -> &'static str;

    /// Whether values live in caches owned by the root container. Such values
    /// are built against the root's registrations and caches even when a
    /// nested container asks for them first.
    fn owned_by_root(&self) -> bool {
        false
    }
}

struct TransientScope;

impl LifecycleScope for TransientScope {
    fn find_cache(
        &self,
        container: &Container,
        _plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure> {
        Ok(container.transient_cache().cloned())
    }

    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport) {
        if let Some(cache) = container.transient_cache() {
            cache.eject(key, report);
        }
    }

    fn description(&self) -> &'static str {
        "Transient"
    }
}

struct SingletonScope;

impl LifecycleScope for SingletonScope {
    fn find_cache(
        &self,
        container: &Container,
        _plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure> {
        Ok(Some(container.singleton_cache().clone()))
    }

    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport) {
        if container.is_root() {
            container.singleton_cache().eject(key, report);
        }
    }

    fn description(&self) -> &'static str {
        "Singleton"
    }

    fn owned_by_root(&self) -> bool {
        true
    }
}

struct ThreadLocalScope;

impl LifecycleScope for ThreadLocalScope {
    fn find_cache(
        &self,
        container: &Container,
        _plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure> {
        Ok(Some(container.thread_cache()))
    }

    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport) {
        if container.is_root() {
            for cache in container.all_thread_caches() {
                cache.eject(key, report);
            }
        }
    }

    fn description(&self) -> &'static str {
        "ThreadLocal"
    }

    fn owned_by_root(&self) -> bool {
        true
    }
}

struct ContextScope;

impl LifecycleScope for ContextScope {
    fn find_cache(
        &self,
        container: &Container,
        plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure> {
        container
            .context_cache()
            .map(Some)
            .ok_or(BuildFailure::NoActiveContext(plugin_type.name()))
    }

    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport) {
        if container.is_root() {
            for cache in container.all_context_caches() {
                cache.eject(key, report);
            }
        }
    }

    fn description(&self) -> &'static str {
        "Context"
    }

    fn owned_by_root(&self) -> bool {
        true
    }
}

struct HybridScopeSelector;

impl LifecycleScope for HybridScopeSelector {
    fn find_cache(
        &self,
        container: &Container,
        plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure> {
        for scope in &container.config().hybrid_order {
            match scope {
                HybridScope::Context => {
                    if let Some(cache) = container.context_cache() {
                        return Ok(Some(cache));
                    }
                }
                HybridScope::ThreadLocal => return Ok(Some(container.thread_cache())),
            }
        }
        Err(BuildFailure::NoActiveContext(plugin_type.name()))
    }

    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport) {
        ContextScope.eject(container, key, report);
        ThreadLocalScope.eject(container, key, report);
    }

    fn description(&self) -> &'static str {
        "Hybrid"
    }

    fn owned_by_root(&self) -> bool {
        true
    }
}

struct ContainerScope;

impl LifecycleScope for ContainerScope {
    fn find_cache(
        &self,
        container: &Container,
        _plugin_type: &PluginType,
    ) -> Result<Option<Arc<ObjectCache>>, BuildFailure> {
        Ok(Some(container.scoped_cache().clone()))
    }

    fn eject(&self, container: &Container, key: &CacheKey, report: &mut DisposalReport) {
        container.scoped_cache().eject(key, report);
    }

    fn description(&self) -> &'static str {
        "ContainerScoped"
    }
}
