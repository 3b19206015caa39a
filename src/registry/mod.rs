//! Registration DSL.
//!
//! A [`Registry`] collects families, open generic templates and
//! missing-family policies, then seals them into a [`Container`].

mod expression;
mod module_system;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

pub use expression::{FamilyExpression, GenericExpression, InstanceExpression};
pub use module_system::{RegistryModule, RegistryModuleExt, RegistryModuleMutExt};

use crate::config::ContainerConfig;
use crate::container::Container;
use crate::graph::{FamilyPolicy, GenericTemplate, MissingNamedFn, PluginFamily, PluginGraph};
use crate::instance::{Instance, InstanceId};
use crate::lifecycle::Lifecycle;
use crate::plugin_type::PluginType;

/// Registrations for one plugin type, kept mutable until the registry is built.
pub(crate) struct FamilyConfig {
    plugin_type: PluginType,
    lifecycle: Option<Lifecycle>,
    instances: Vec<Instance>,
    default: Option<InstanceId>,
    missing_named: Option<MissingNamedFn>,
}

impl FamilyConfig {
    fn new(plugin_type: PluginType) -> Self {
        Self {
            plugin_type,
            lifecycle: None,
            instances: Vec::new(),
            default: None,
            missing_named: None,
        }
    }

    fn push(&mut self, instance: Instance) -> InstanceExpression<'_> {
        self.instances.push(instance);
        let index = self.instances.len() - 1;
        InstanceExpression::new(&mut self.instances[index])
    }

    fn seal(self) -> PluginFamily {
        let mut family = PluginFamily::for_plugin_type(self.plugin_type.clone()).with_missing_named(self.missing_named);
        if let Some(lifecycle) = self.lifecycle {
            family = family.with_lifecycle(lifecycle);
        }
        for instance in self.instances {
            if instance.plugin_type() != &self.plugin_type {
                tracing::warn!(
                    plugin_type = self.plugin_type.name(),
                    instance = instance.name(),
                    builds = instance.plugin_type().name(),
                    "instance registered for the wrong plugin type was skipped"
                );
                continue;
            }
            family = if Some(instance.id()) == self.default {
                family.with_default(instance)
            } else {
                family.add(instance)
            };
        }
        family
    }
}

/// Collects registrations and builds a [`Container`].
///
/// # Examples
///
/// ```rust
/// use structuremap::{plugs, Describe, Pluggable, Registry, Resolver};
/// use std::sync::Arc;
///
/// trait Notifier: Send + Sync {
///     fn channel(&self) -> String;
/// }
///
/// struct Email { sender: String }
/// impl Notifier for Email {
///     fn channel(&self) -> String { format!("email from {}", self.sender) }
/// }
/// impl Pluggable for Email {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|args| Ok(Email { sender: args.value::<String>("sender")? }))
///             .value::<String>("sender");
///     }
/// }
///
/// struct Sms;
/// impl Notifier for Sms {
///     fn channel(&self) -> String { "sms".into() }
/// }
/// impl Pluggable for Sms {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|_| Ok(Sms));
///     }
/// }
///
/// plugs!(Email => dyn Notifier);
/// plugs!(Sms => dyn Notifier);
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<dyn Notifier>()
///     .use_type::<Email>()
///     .ctor_value("sender", "ops@example.com".to_string());
/// registry.for_type::<dyn Notifier>().add_type::<Sms>().named("sms");
///
/// let container = registry.build();
/// assert_eq!(container.get_instance::<dyn Notifier>().unwrap().channel(), "email from ops@example.com");
/// assert_eq!(container.get_named_instance::<dyn Notifier>("sms").unwrap().channel(), "sms");
/// assert_eq!(container.get_all_instances::<dyn Notifier>().unwrap().len(), 2);
/// ```
pub struct Registry {
    families: Vec<FamilyConfig>,
    templates: HashMap<&'static str, GenericTemplate>,
    policies: Vec<Arc<dyn FamilyPolicy>>,
    config: ContainerConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            families: Vec::new(),
            templates: HashMap::new(),
            policies: Vec::new(),
            config: ContainerConfig::default(),
        }
    }

    /// Starts or continues the family for plugin type `P`.
    pub fn for_type<P: ?Sized + Send + Sync + 'static>(&mut self) -> FamilyExpression<'_, P> {
        FamilyExpression::new(self.family_mut(PluginType::of::<P>()))
    }

    /// Starts or continues the open generic template named `template`.
    pub fn for_generic(&mut self, template: &'static str) -> GenericExpression<'_> {
        GenericExpression::new(self.templates.entry(template).or_default())
    }

    /// Adds a policy consulted when a plugin type has no family.
    pub fn on_missing_family<F: FamilyPolicy + 'static>(&mut self, policy: F) -> &mut Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Adds an instance to the family of its own plugin type, without
    /// changing that family's default.
    pub fn add_instance(&mut self, instance: Instance) -> &mut Self {
        self.family_mut(instance.plugin_type().clone()).push(instance);
        self
    }

    /// Adds an instance and makes it the default of its family.
    pub fn set_default(&mut self, instance: Instance) -> &mut Self {
        let family = self.family_mut(instance.plugin_type().clone());
        family.default = Some(instance.id());
        family.push(instance);
        self
    }

    pub fn with_config(&mut self, config: ContainerConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Whether anything was registered for `P`.
    pub fn has_family<P: ?Sized + 'static>(&self) -> bool {
        let id = TypeId::of::<P>();
        self.families.iter().any(|family| family.plugin_type.id() == id)
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    fn family_mut(&mut self, plugin_type: PluginType) -> &mut FamilyConfig {
        let index = match self.families.iter().position(|family| family.plugin_type == plugin_type) {
            Some(index) => index,
            None => {
                self.families.push(FamilyConfig::new(plugin_type));
                self.families.len() - 1
            }
        };
        &mut self.families[index]
    }

    /// Seals the registrations into a root container.
    pub fn build(self) -> Container {
        Container::new(Arc::new(self.build_graph(None)))
    }

    /// Seals the registrations into a graph layered over `parent`, which
    /// also supplies the configuration.
    pub(crate) fn build_graph(self, parent: Option<Arc<PluginGraph>>) -> PluginGraph {
        let config = match &parent {
            Some(parent) => parent.config_arc().clone(),
            None => Arc::new(self.config),
        };
        let families = self.families.into_iter().map(FamilyConfig::seal).collect();
        PluginGraph::new(parent, families, self.templates, self.policies, config)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("families", &self.families.len())
            .field("templates", &self.templates.len())
            .field("policies", &self.policies.len())
            .field("config", &self.config)
            .finish()
    }
}
