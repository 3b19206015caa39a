use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::NamedFallback;
use crate::error::{ContainerError, ContainerResult};
use crate::instance::{Instance, InstanceId, DEFAULT};
use crate::lifecycle::Lifecycle;
use crate::plugin_type::PluginType;

pub(crate) type MissingNamedFn = Arc<dyn Fn(&str) -> Option<Instance> + Send + Sync>;

/// Every instance registered for one plugin type.
///
/// Families are assembled by value and are immutable once added to a
/// [`PluginGraph`](crate::PluginGraph). Instance names are unique; adding an
/// instance under an existing name replaces the earlier one in place.
///
/// # Examples
///
/// ```rust
/// use structuremap::{Instance, Lifecycle, PluginFamily};
/// use std::sync::Arc;
///
/// let family = PluginFamily::new::<String>()
///     .with_lifecycle(Lifecycle::Singleton)
///     .add(Instance::object::<String>(Arc::new("red".into())).named("red"))
///     .with_default(Instance::object::<String>(Arc::new("blue".into())).named("blue"));
///
/// assert_eq!(family.len(), 2);
/// assert_eq!(family.default_instance().unwrap().name(), "blue");
/// assert!(family.instance_named("red").is_some());
/// ```
pub struct PluginFamily {
    plugin_type: PluginType,
    instances: Vec<Arc<Instance>>,
    default: Option<usize>,
    lifecycle: Option<Lifecycle>,
    missing_named: Option<MissingNamedFn>,
    synthesized: RwLock<HashMap<String, Arc<Instance>>>,
}

impl PluginFamily {
    pub fn new<P: ?Sized + 'static>() -> Self {
        Self::for_plugin_type(PluginType::of::<P>())
    }

    pub fn for_plugin_type(plugin_type: PluginType) -> Self {
        Self {
            plugin_type,
            instances: Vec::new(),
            default: None,
            lifecycle: None,
            missing_named: None,
            synthesized: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn add(mut self, instance: Instance) -> Self {
        self.push(instance);
        self
    }

    /// Adds `instance` and makes it the default.
    pub fn with_default(mut self, instance: Instance) -> Self {
        let index = self.push(instance);
        self.default = Some(index);
        self
    }

    /// Synthesizes instances for names that were never registered.
    pub fn missing_named_instance_is<F>(mut self, policy: F) -> Self
    where
        F: Fn(&str) -> Option<Instance> + Send + Sync + 'static,
    {
        self.missing_named = Some(Arc::new(policy));
        self
    }

    pub(crate) fn with_missing_named(mut self, policy: Option<MissingNamedFn>) -> Self {
        self.missing_named = policy;
        self
    }

    fn push(&mut self, instance: Instance) -> usize {
        let instance = Arc::new(instance);
        match self.instances.iter().position(|i| i.name() == instance.name()) {
            Some(index) => {
                self.instances[index] = instance;
                index
            }
            None => {
                self.instances.push(instance);
                self.instances.len() - 1
            }
        }
    }

    pub fn plugin_type(&self) -> &PluginType {
        &self.plugin_type
    }

    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    /// Registered instances in registration order.
    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }

    /// Instances produced so far by the missing-named-instance policy.
    pub fn synthesized_instances(&self) -> Vec<Arc<Instance>> {
        self.synthesized.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The explicit default, or the only instance when there is exactly one.
    pub fn default_instance(&self) -> Option<Arc<Instance>> {
        match self.default {
            Some(index) => self.instances.get(index).cloned(),
            None if self.instances.len() == 1 => self.instances.first().cloned(),
            None => None,
        }
    }

    pub fn instance_named(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances.iter().find(|i| i.name() == name).cloned()
    }

    /// Whether the instance with `id` was registered or synthesized here.
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.iter().any(|i| i.id() == id) || self.synthesized.read().values().any(|i| i.id() == id)
    }

    /// Whether names that were never registered can be synthesized.
    pub fn has_missing_named_policy(&self) -> bool {
        self.missing_named.is_some()
    }

    /// Whether `name` was registered or already synthesized.
    pub fn has_instance(&self, name: &str) -> bool {
        self.instance_named(name).is_some() || self.synthesized.read().contains_key(name)
    }

    /// Finds the instance to build for `name`.
    ///
    /// `None` and `"default"` select the default instance. An exact name match
    /// wins; otherwise `fallbacks` are tried in order.
    pub fn find_instance(&self, name: Option<&str>, fallbacks: &[NamedFallback]) -> ContainerResult<Arc<Instance>> {
        let requested = match name {
            None | Some(DEFAULT) => {
                return self.default_instance().ok_or_else(|| self.unresolvable(DEFAULT));
            }
            Some(name) => name,
        };

        if let Some(instance) = self.instance_named(requested) {
            return Ok(instance);
        }

        for fallback in fallbacks {
            let found = match fallback {
                NamedFallback::Policy => self.synthesize(requested),
                NamedFallback::Default => self.default_instance(),
            };
            if let Some(instance) = found {
                return Ok(instance);
            }
        }
        Err(self.unresolvable(requested))
    }

    fn synthesize(&self, name: &str) -> Option<Arc<Instance>> {
        let policy = self.missing_named.as_ref()?;
        if let Some(instance) = self.synthesized.read().get(name) {
            return Some(instance.clone());
        }

        let mut instance = policy(name)?;
        if instance.plugin_type() != &self.plugin_type {
            tracing::warn!(
                plugin_type = self.plugin_type.name(),
                produced = instance.plugin_type().name(),
                "missing named instance policy produced the wrong plugin type"
            );
            return None;
        }
        instance.set_name(name);
        tracing::debug!(plugin_type = self.plugin_type.name(), name, "synthesized named instance");

        let mut synthesized = self.synthesized.write();
        Some(
            synthesized
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(instance))
                .clone(),
        )
    }

    fn unresolvable(&self, name: &str) -> ContainerError {
        ContainerError::UnresolvableInstance {
            plugin_type: self.plugin_type.name(),
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for PluginFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFamily")
            .field("plugin_type", &self.plugin_type)
            .field("instances", &self.instances.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("default", &self.default_instance().map(|i| i.name().to_string()))
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str) -> Instance {
        Instance::object::<String>(Arc::new(text.to_string())).named(text)
    }

    #[test]
    fn sole_instance_is_the_default() {
        let family = PluginFamily::new::<String>().add(value("only"));
        assert_eq!(family.default_instance().unwrap().name(), "only");

        let family = family.add(value("second"));
        assert!(family.default_instance().is_none());
    }

    #[test]
    fn duplicate_names_replace_in_place() {
        let family = PluginFamily::new::<String>()
            .add(value("a"))
            .add(value("b"))
            .add(value("a"));
        let names: Vec<_> = family.instances().iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn missing_names_fall_back_in_configured_order() {
        let family = PluginFamily::new::<String>()
            .with_default(value("main"))
            .missing_named_instance_is(|name| Some(value(&format!("made-{}", name))));

        let made = family.find_instance(Some("x"), &[NamedFallback::Policy]).unwrap();
        assert_eq!(made.name(), "x");
        let again = family.find_instance(Some("x"), &[NamedFallback::Policy]).unwrap();
        assert!(Arc::ptr_eq(&made, &again));

        let fallback = family
            .find_instance(Some("y"), &[NamedFallback::Default, NamedFallback::Policy])
            .unwrap();
        assert_eq!(fallback.name(), "main");

        assert!(matches!(
            family.find_instance(Some("z"), &[]),
            Err(ContainerError::UnresolvableInstance { .. })
        ));
    }

    #[test]
    fn default_lookup_without_default_is_unresolvable() {
        let family = PluginFamily::new::<String>().add(value("a")).add(value("b"));
        match family.find_instance(None, &[]) {
            Err(ContainerError::UnresolvableInstance { name, .. }) => assert_eq!(name, "default"),
            other => panic!("unexpected: {:?}", other.map(|i| i.name().to_string())),
        }
    }
}
