//! Policies that create families the registry never configured.

use std::sync::Arc;

use crate::graph::PluginFamily;
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;
use crate::plugin_type::{GenericShape, PluginType};

/// Supplies a family for a plugin type that has none.
///
/// Policies are consulted in registration order; the first to return a
/// family wins and the family is cached in the graph.
///
/// # Examples
///
/// ```rust
/// use structuremap::{Instance, PluginFamily, PluginType, Registry, Resolver};
/// use std::sync::Arc;
///
/// let mut registry = Registry::new();
/// registry.on_missing_family(|plugin_type: &PluginType| {
///     plugin_type.is::<String>().then(|| {
///         PluginFamily::new::<String>().add(Instance::object::<String>(Arc::new("fallback".into())))
///     })
/// });
///
/// let container = registry.build();
/// assert_eq!(*container.get_instance::<String>().unwrap(), "fallback");
/// ```
pub trait FamilyPolicy: Send + Sync {
    fn build_family(&self, plugin_type: &PluginType) -> Option<PluginFamily>;
}

impl<F> FamilyPolicy for F
where
    F: Fn(&PluginType) -> Option<PluginFamily> + Send + Sync,
{
    fn build_family(&self, plugin_type: &PluginType) -> Option<PluginFamily> {
        self(plugin_type)
    }
}

/// Registers concrete [`Pluggable`](crate::Pluggable) types on first request.
pub(crate) struct AutoConcretePolicy;

impl FamilyPolicy for AutoConcretePolicy {
    fn build_family(&self, plugin_type: &PluginType) -> Option<PluginFamily> {
        let instance = plugin_type.auto_instance()?;
        Some(PluginFamily::for_plugin_type(plugin_type.clone()).add(instance))
    }
}

pub(crate) type CloserFn = Arc<dyn Fn(&PluginType, &GenericShape) -> Option<Instance> + Send + Sync>;

/// One way a template closes a requested generic type.
#[derive(Clone)]
pub(crate) enum TemplateCloser {
    /// Build the requested closed type itself.
    Requested,
    /// Ask the requested type for the named implementation.
    Implementation(&'static str),
    /// Ask a user closure for an instance.
    Closer(CloserFn),
}

/// An open generic registration, closed on demand for each set of type
/// arguments.
#[derive(Clone, Default)]
pub struct GenericTemplate {
    pub(crate) closers: Vec<TemplateCloser>,
    pub(crate) lifecycle: Option<Lifecycle>,
}

impl GenericTemplate {
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    pub fn closer_count(&self) -> usize {
        self.closers.len()
    }

    /// Closes the template for `requested`, or `None` when no closer applies.
    pub(crate) fn close(&self, requested: &PluginType) -> Option<PluginFamily> {
        let shape = requested.shape()?;
        let mut family = PluginFamily::for_plugin_type(requested.clone());
        let mut closed_any = false;

        for closer in &self.closers {
            let instance = match closer {
                TemplateCloser::Requested => requested.auto_instance(),
                TemplateCloser::Implementation(name) => shape.close(name).map(|instance| instance.named(*name)),
                TemplateCloser::Closer(close) => close(requested, shape),
            };
            let Some(instance) = instance else { continue };
            if instance.plugin_type() != requested {
                tracing::warn!(
                    template = shape.template(),
                    requested = requested.name(),
                    produced = instance.plugin_type().name(),
                    "generic closer produced the wrong plugin type"
                );
                continue;
            }
            family = family.add(instance);
            closed_any = true;
        }

        if !closed_any {
            return None;
        }
        if let Some(lifecycle) = self.lifecycle {
            family = family.with_lifecycle(lifecycle);
        }
        Some(family)
    }
}

impl std::fmt::Debug for GenericTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericTemplate")
            .field("closers", &self.closers.len())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
