//! The per-resolve build session.

use std::sync::Arc;

use crate::error::{BuildError, BuildFailure, ContainerError, ContainerResult};
use crate::graph::PluginFamily;
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;
use crate::internal::{BuildStack, FrameKey, StackGuard};
use crate::plugin_type::{Object, PluginType};
use crate::traits::{Resolver, ResolverCore};

use super::Container;

/// State for one top-level resolve.
///
/// A session is created for every request made on a [`Container`] and is
/// handed to factories registered with
/// [`use_factory`](crate::registry::FamilyExpression::use_factory). Resolving
/// through the session, rather than the container, keeps the build stack so
/// that cycles passing through factories are detected.
///
/// # Examples
///
/// ```rust
/// use structuremap::{Registry, Resolver};
/// use std::sync::Arc;
///
/// struct Settings { url: String }
/// struct Client { url: String }
///
/// let mut registry = Registry::new();
/// registry.for_type::<Settings>().use_value(Arc::new(Settings { url: "db://main".into() }));
/// registry.for_type::<Client>().use_factory(|session| {
///     let settings = session.get_instance::<Settings>()?;
///     Ok(Arc::new(Client { url: settings.url.clone() }))
/// });
///
/// let container = registry.build();
/// assert_eq!(container.get_instance::<Client>().unwrap().url, "db://main");
/// ```
pub struct BuildSession<'c> {
    container: &'c Container,
    stack: SessionStack<'c>,
}

enum SessionStack<'c> {
    Owned(BuildStack),
    Shared(&'c BuildStack),
}

impl<'c> BuildSession<'c> {
    pub(crate) fn new(container: &'c Container) -> Self {
        Self {
            container,
            stack: SessionStack::Owned(BuildStack::new(container.config().max_build_depth)),
        }
    }

    fn stack(&self) -> &BuildStack {
        match &self.stack {
            SessionStack::Owned(stack) => stack,
            SessionStack::Shared(stack) => stack,
        }
    }

    /// Runs `f` in a session over `container` that continues this session's
    /// build stack.
    pub(crate) fn within<R>(&self, container: &Container, f: impl FnOnce(&BuildSession<'_>) -> R) -> R {
        let session = BuildSession {
            container,
            stack: SessionStack::Shared(self.stack()),
        };
        f(&session)
    }

    /// The root container when `instance` lives in a root-owned cache and is
    /// registered in the root graph. `None` when it builds right here.
    pub(crate) fn root_home(&self, lifecycle: Lifecycle, plugin_type: &PluginType, instance: &Instance) -> Option<Container> {
        if self.container.is_root() || !lifecycle.scope().owned_by_root() {
            return None;
        }
        let root = self.container.root();
        let registered = root
            .graph()
            .existing_family(plugin_type.id())
            .map_or(false, |family| family.contains(instance.id()));
        registered.then_some(root)
    }

    /// The container this session builds for.
    pub fn container(&self) -> &'c Container {
        self.container
    }

    /// Number of builds currently in progress.
    pub fn depth(&self) -> usize {
        self.stack().depth()
    }

    /// Descriptions of the builds in progress, outermost first.
    pub fn path(&self) -> Vec<String> {
        self.stack().path()
    }

    pub(crate) fn enter(&self, key: FrameKey, description: &Arc<str>) -> Result<StackGuard<'_>, BuildError> {
        self.stack().push(key, description)
    }

    /// Wraps `failure` with the current build path.
    pub(crate) fn fail(&self, failure: BuildFailure) -> ContainerError {
        ContainerError::Build(BuildError::new(self.stack().path(), failure))
    }

    fn build(&self, family: &PluginFamily, instance: &Arc<Instance>) -> ContainerResult<Object> {
        let lifecycle = instance.lifecycle().or(family.lifecycle()).unwrap_or_default();
        if let Some(root) = self.root_home(lifecycle, family.plugin_type(), instance) {
            return self.within(&root, |session| session.build(family, instance));
        }
        let plan = self.container.graph().plan_for(family, instance);
        Ok(plan.execute(self)?.object)
    }
}

impl ResolverCore for BuildSession<'_> {
    fn resolve_object(&self, plugin_type: &PluginType, name: Option<&str>) -> ContainerResult<Object> {
        let graph = self.container.graph();
        let family = graph.find_family(plugin_type)?;
        let instance = family.find_instance(name, &graph.config().named_fallbacks)?;
        self.build(&family, &instance)
    }

    fn try_resolve_object(&self, plugin_type: &PluginType, name: Option<&str>) -> ContainerResult<Option<Object>> {
        let graph = self.container.graph();
        let family = match graph.find_family(plugin_type) {
            Ok(family) => family,
            Err(err) if err.is_missing() => return Ok(None),
            Err(err) => return Err(err),
        };
        let instance = match family.find_instance(name, &graph.config().named_fallbacks) {
            Ok(instance) => instance,
            Err(err) if err.is_missing() => return Ok(None),
            Err(err) => return Err(err),
        };
        self.build(&family, &instance).map(Some)
    }

    fn resolve_all_objects(&self, plugin_type: &PluginType) -> ContainerResult<Vec<Object>> {
        let family = match self.container.graph().find_family(plugin_type) {
            Ok(family) => family,
            Err(err) if err.is_missing() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        family
            .instances()
            .iter()
            .map(|instance| self.build(&family, instance))
            .collect()
    }
}

impl Resolver for BuildSession<'_> {}
