//! "What do I have" reports over a plugin graph.
//!
//! Reports compile build plans with an inspecting [`PlanCompiler`] and never
//! execute or store them. Producing one leaves caches, the plan cache and
//! the family map untouched, and runs no policies.

use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::compiler::PlanCompiler;
use crate::dependency::DependencySource;
use crate::error::Problem;
use crate::graph::{PluginFamily, PluginGraph};
#[cfg(feature = "config")]
use crate::error::{ContainerError, ContainerResult};

/// Every family visible from a container.
///
/// # Examples
///
/// ```rust
/// use structuremap::Registry;
/// use std::sync::Arc;
///
/// let mut registry = Registry::new();
/// registry.for_type::<String>().singleton().use_value(Arc::new("x".into()));
/// let model = registry.build().model();
///
/// let family = model.family("alloc::string::String").unwrap();
/// assert_eq!(family.lifecycle, "Singleton");
/// assert!(model.problems().is_empty());
/// assert!(model.to_string().contains("alloc::string::String"));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GraphReport {
    pub families: Vec<FamilyReport>,
    pub templates: Vec<&'static str>,
}

/// One plugin family.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FamilyReport {
    pub plugin_type: &'static str,
    pub lifecycle: &'static str,
    pub default: Option<String>,
    pub instances: Vec<InstanceReport>,
}

/// One instance and the plan compiled for it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct InstanceReport {
    pub name: String,
    pub description: String,
    pub lifecycle: &'static str,
    pub plan: String,
    /// Plugin types the plan resolves at run time.
    pub dependencies: Vec<String>,
    pub problems: Vec<Problem>,
}

impl GraphReport {
    pub(crate) fn build(graph: &PluginGraph) -> Self {
        let families = graph.families().iter().map(|family| family_report(graph, family)).collect();
        Self {
            families,
            templates: graph.template_names(),
        }
    }

    /// The family whose plugin type name is `plugin_type`.
    pub fn family(&self, plugin_type: &str) -> Option<&FamilyReport> {
        self.families.iter().find(|family| family.plugin_type == plugin_type)
    }

    pub fn instance_count(&self) -> usize {
        self.families.iter().map(|family| family.instances.len()).sum()
    }

    /// Every problem found while compiling.
    pub fn problems(&self) -> Vec<&Problem> {
        self.families
            .iter()
            .flat_map(|family| family.instances.iter())
            .flat_map(|instance| instance.problems.iter())
            .collect()
    }

    #[cfg(feature = "config")]
    pub fn to_json(&self) -> ContainerResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ContainerError::InvalidConfig(e.to_string()))
    }
}

fn family_report(graph: &PluginGraph, family: &PluginFamily) -> FamilyReport {
    let instances = family
        .instances()
        .iter()
        .map(|instance| {
            let lifecycle = instance.lifecycle().or(family.lifecycle()).unwrap_or_default();
            let plan = PlanCompiler::inspecting(graph).compile(instance, lifecycle);
            let mut dependencies = Vec::new();
            collect_dependencies(plan.source(), &mut dependencies);
            InstanceReport {
                name: instance.name().to_string(),
                description: instance.description(),
                lifecycle: plan.lifecycle().description(),
                plan: plan.describe(),
                dependencies,
                problems: plan.problems(),
            }
        })
        .collect();
    FamilyReport {
        plugin_type: family.plugin_type().name(),
        lifecycle: family.lifecycle().unwrap_or_default().description(),
        default: family.default_instance().map(|instance| instance.name().to_string()),
        instances,
    }
}

fn collect_dependencies(source: &DependencySource, into: &mut Vec<String>) {
    match source {
        DependencySource::Referenced { .. } | DependencySource::AllPossibleOf { .. } => {
            let text = source.describe();
            if !into.contains(&text) {
                into.push(text);
            }
        }
        DependencySource::LifecycleWrapped { inner, .. } => collect_dependencies(inner, into),
        DependencySource::Construct { arguments, setters, .. } => {
            for (_, argument) in arguments {
                collect_dependencies(argument, into);
            }
            for (_, setter) in setters {
                collect_dependencies(setter, into);
            }
        }
        _ => {}
    }
}

impl fmt::Display for GraphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str = "==============================================================================";
        writeln!(f, "{:<40} {:<16} {}", "PluginType", "Lifecycle", "Instances")?;
        writeln!(f, "{}", RULE)?;
        for family in &self.families {
            writeln!(f, "{:<40} {:<16} {}", family.plugin_type, family.lifecycle, family.instances.len())?;
            for instance in &family.instances {
                let marker = if family.default.as_deref() == Some(instance.name.as_str()) {
                    "(Default)"
                } else {
                    ""
                };
                writeln!(f, "    {:<36} {:<16} {} {}", instance.name, instance.lifecycle, instance.description, marker)?;
                for problem in &instance.problems {
                    writeln!(f, "        ! {}", problem)?;
                }
            }
        }
        if !self.templates.is_empty() {
            writeln!(f, "{}", RULE)?;
            writeln!(f, "Open generic templates: {}", self.templates.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::{Describe, Pluggable};
    use crate::registry::Registry;
    use std::sync::Arc;

    struct Engine;
    struct Car {
        _engine: Arc<Engine>,
    }

    impl Pluggable for Car {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|args| {
                Ok(Car {
                    _engine: args.get::<Engine>("engine")?,
                })
            })
            .dependency::<Engine>("engine");
        }
    }

    #[test]
    fn reports_problems_without_building() {
        let mut registry = Registry::new();
        registry.for_type::<Car>().use_type::<Car>();
        registry.for_generic("Repository");
        let model = registry.build().model();

        assert_eq!(model.instance_count(), 1);
        assert_eq!(model.templates, vec!["Repository"]);
        let problems = model.problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].location.contains("engine"));
        assert!(model.to_string().contains("! "));
    }

    #[test]
    fn building_a_report_leaves_the_graph_alone() {
        use crate::plugin_type::PluginType;
        use crate::traits::Resolver;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry.for_type::<Car>().use_type::<Car>();
        let counter = calls.clone();
        registry.on_missing_family(move |_: &PluginType| -> Option<PluginFamily> {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });
        let container = registry.build();

        let model = container.model();
        assert!(model.problems().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(container.graph().plan_count(), 0);
        assert_eq!(container.graph().families().len(), 1);

        assert!(container.get_instance::<Car>().is_err());
        assert!(calls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn lists_run_time_dependencies() {
        let mut registry = Registry::new();
        registry.for_type::<Engine>().use_value(Arc::new(Engine));
        registry.for_type::<Car>().use_type::<Car>();
        let model = registry.build().model();

        let car = model.family(std::any::type_name::<Car>()).unwrap();
        assert_eq!(car.default.as_deref(), Some(car.instances[0].name.as_str()));
        assert_eq!(car.instances[0].dependencies.len(), 1);
        assert!(car.instances[0].dependencies[0].starts_with("Default "));
        assert!(model.problems().is_empty());
    }
}
