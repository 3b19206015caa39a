//! The plugin graph: every family a container can resolve, plus the
//! templates and policies that create families on demand.

mod family;
mod policy;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub use family::PluginFamily;
pub(crate) use family::MissingNamedFn;
pub use policy::{FamilyPolicy, GenericTemplate};
pub(crate) use policy::{AutoConcretePolicy, CloserFn, TemplateCloser};

use crate::compiler::{BuildPlan, PlanCompiler};
use crate::config::ContainerConfig;
use crate::error::{ContainerError, ContainerResult};
use crate::instance::{Instance, InstanceId};
use crate::internal::FastMap;
use crate::introspection::TypeCatalog;
use crate::plugin_type::PluginType;

/// Families, templates, policies and compiled plans for one container layer.
///
/// A nested container with its own registrations gets a child graph whose
/// parent is the enclosing container's graph; lookups fall through to the
/// parent.
pub struct PluginGraph {
    parent: Option<Arc<PluginGraph>>,
    families: RwLock<FastMap<TypeId, Arc<PluginFamily>>>,
    order: RwLock<Vec<TypeId>>,
    templates: HashMap<&'static str, GenericTemplate>,
    policies: Vec<Arc<dyn FamilyPolicy>>,
    catalog: Arc<TypeCatalog>,
    plans: RwLock<FastMap<InstanceId, Arc<BuildPlan>>>,
    config: Arc<ContainerConfig>,
}

impl PluginGraph {
    pub(crate) fn new(
        parent: Option<Arc<PluginGraph>>,
        families: Vec<PluginFamily>,
        templates: HashMap<&'static str, GenericTemplate>,
        policies: Vec<Arc<dyn FamilyPolicy>>,
        config: Arc<ContainerConfig>,
    ) -> Self {
        let catalog = parent
            .as_ref()
            .map(|p| p.catalog.clone())
            .unwrap_or_default();
        let graph = Self {
            parent,
            families: RwLock::new(FastMap::default()),
            order: RwLock::new(Vec::new()),
            templates,
            policies,
            catalog,
            plans: RwLock::new(FastMap::default()),
            config,
        };
        for family in families {
            graph.adopt(family);
        }
        graph
    }

    pub fn parent(&self) -> Option<&Arc<PluginGraph>> {
        self.parent.as_ref()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub(crate) fn config_arc(&self) -> &Arc<ContainerConfig> {
        &self.config
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Finds or creates the family for `plugin_type`.
    ///
    /// Lookup order: a family in this graph, a template in this graph that
    /// closes the type, the parent graph, missing-family policies, and last
    /// automatic registration of concrete types. Created families are cached
    /// here; when two threads race, the first family stored wins.
    pub fn find_family(&self, plugin_type: &PluginType) -> ContainerResult<Arc<PluginFamily>> {
        if let Some(family) = self.lookup(plugin_type) {
            return Ok(family);
        }

        if let Some(family) = self.apply_policies(plugin_type) {
            tracing::debug!(plugin_type = plugin_type.name(), "family created by policy");
            return Ok(self.adopt(family));
        }

        if self.config.auto_register_concrete {
            if let Some(family) = AutoConcretePolicy.build_family(plugin_type) {
                tracing::debug!(plugin_type = plugin_type.name(), "auto-registered concrete type");
                return Ok(self.adopt(family));
            }
        }

        Err(ContainerError::MissingPluginFamily(plugin_type.name()))
    }

    /// Looks up the family for `plugin_type` without changing the graph or
    /// running user code.
    ///
    /// `Ok(None)` means a template or missing-family policy might supply the
    /// family when it is actually requested. A family the built-in
    /// auto-registration would create is returned but not stored.
    pub fn peek_family(&self, plugin_type: &PluginType) -> ContainerResult<Option<Arc<PluginFamily>>> {
        if let Some(family) = self.existing_family(plugin_type.id()) {
            return Ok(Some(family));
        }
        let closable = plugin_type
            .shape()
            .map_or(false, |shape| self.has_template(shape.template()));
        if closable || self.has_policies() {
            return Ok(None);
        }
        if self.config.auto_register_concrete {
            if let Some(family) = AutoConcretePolicy.build_family(plugin_type) {
                return Ok(Some(Arc::new(family)));
            }
        }
        Err(ContainerError::MissingPluginFamily(plugin_type.name()))
    }

    fn has_template(&self, template: &str) -> bool {
        self.templates.contains_key(template) || self.parent.as_ref().map_or(false, |p| p.has_template(template))
    }

    fn has_policies(&self) -> bool {
        !self.policies.is_empty() || self.parent.as_ref().map_or(false, |p| p.has_policies())
    }

    /// Explicit families and template closings, this graph then its parents.
    fn lookup(&self, plugin_type: &PluginType) -> Option<Arc<PluginFamily>> {
        if let Some(family) = self.families.read().get(&plugin_type.id()) {
            return Some(family.clone());
        }

        if let Some(family) = self.close_generic(plugin_type) {
            return Some(self.adopt(family));
        }

        self.parent.as_ref()?.lookup(plugin_type)
    }

    fn close_generic(&self, plugin_type: &PluginType) -> Option<PluginFamily> {
        let shape = plugin_type.shape()?;
        let template = self.templates.get(shape.template())?;
        let family = template.close(plugin_type)?;
        tracing::debug!(
            template = shape.template(),
            closed = plugin_type.name(),
            instances = family.len(),
            "closed generic template"
        );
        Some(family)
    }

    fn apply_policies(&self, plugin_type: &PluginType) -> Option<PluginFamily> {
        let mut graph = Some(self);
        while let Some(current) = graph {
            for policy in &current.policies {
                if let Some(family) = policy.build_family(plugin_type) {
                    if family.plugin_type() == plugin_type {
                        return Some(family);
                    }
                    tracing::warn!(
                        requested = plugin_type.name(),
                        produced = family.plugin_type().name(),
                        "missing family policy produced a family for another type"
                    );
                }
            }
            graph = current.parent.as_deref();
        }
        None
    }

    /// Stores `family` unless one is already present, returning the stored one.
    fn adopt(&self, family: PluginFamily) -> Arc<PluginFamily> {
        let id = family.plugin_type().id();
        let mut families = self.families.write();
        if let Some(existing) = families.get(&id) {
            return existing.clone();
        }
        let family = Arc::new(family);
        families.insert(id, family.clone());
        self.order.write().push(id);
        family
    }

    /// Whether this graph (not its parents) holds a family for `id`.
    pub fn has_family(&self, id: TypeId) -> bool {
        self.families.read().contains_key(&id)
    }

    /// The family stored in this graph or a parent, without creating one.
    pub fn existing_family(&self, id: TypeId) -> Option<Arc<PluginFamily>> {
        if let Some(family) = self.families.read().get(&id) {
            return Some(family.clone());
        }
        self.parent.as_ref()?.existing_family(id)
    }

    /// Removes a family from this graph and forgets its compiled plans.
    pub fn remove_family(&self, id: TypeId) -> Option<Arc<PluginFamily>> {
        let removed = self.families.write().remove(&id)?;
        self.order.write().retain(|existing| *existing != id);
        let mut plans = self.plans.write();
        for instance in removed.instances().iter().chain(removed.synthesized_instances().iter()) {
            plans.remove(&instance.id());
        }
        tracing::debug!(plugin_type = removed.plugin_type().name(), "family removed");
        Some(removed)
    }

    /// Families visible from this graph in registration order, parents first.
    /// A family in this graph hides a parent family for the same type.
    pub fn families(&self) -> Vec<Arc<PluginFamily>> {
        let mut families = self
            .parent
            .as_ref()
            .map(|parent| parent.families())
            .unwrap_or_default();
        let local = self.families.read();
        families.retain(|family| !local.contains_key(&family.plugin_type().id()));
        families.extend(self.order.read().iter().filter_map(|id| local.get(id).cloned()));
        families
    }

    /// Names of templates visible from this graph.
    pub fn template_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .parent
            .as_ref()
            .map(|parent| parent.template_names())
            .unwrap_or_default();
        for name in self.templates.keys() {
            if !names.contains(name) {
                names.push(name);
            }
        }
        names.sort_unstable();
        names
    }

    /// The compiled plan for `instance`, compiling it on first request.
    pub fn plan_for(&self, family: &PluginFamily, instance: &Arc<Instance>) -> Arc<BuildPlan> {
        if let Some(plan) = self.plans.read().get(&instance.id()) {
            return plan.clone();
        }

        let lifecycle = instance.lifecycle().or(family.lifecycle()).unwrap_or_default();
        let plan = Arc::new(PlanCompiler::new(self).compile(instance, lifecycle));
        tracing::debug!(instance = instance.name(), lifecycle = %lifecycle, "compiled build plan");
        self.plans.write().entry(instance.id()).or_insert(plan).clone()
    }

    /// Number of plans compiled in this graph.
    pub fn plan_count(&self) -> usize {
        self.plans.read().len()
    }
}

impl std::fmt::Debug for PluginGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginGraph")
            .field("families", &self.order.read().len())
            .field("templates", &self.templates.len())
            .field("policies", &self.policies.len())
            .field("plans", &self.plan_count())
            .field("nested", &self.parent.is_some())
            .finish()
    }
}
