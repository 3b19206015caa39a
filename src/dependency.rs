//! The dependency source tree a build plan is compiled from.

use std::sync::Arc;

use crate::error::Problem;
use crate::instance::{FinishFn, Instance, LambdaFn};
use crate::introspection::ConcreteType;
use crate::lifecycle::Lifecycle;
use crate::plugin_type::{Object, PluginType};

/// One node of a build plan, describing where a value comes from.
///
/// Trees are produced by the [`PlanCompiler`](crate::PlanCompiler) and kept on
/// each [`BuildPlan`](crate::BuildPlan) for diagnostics.
#[derive(Clone)]
pub enum DependencySource {
    /// A fixed value.
    Constant { value_type: PluginType, value: Object },
    /// Resolve an instance of `plugin_type` at run time; the default instance
    /// when `name` is `None`.
    Referenced { plugin_type: PluginType, name: Option<String> },
    /// Resolve every instance of `plugin_type`.
    AllPossibleOf { plugin_type: PluginType },
    /// Build `inner` through the cache chosen by `lifecycle`.
    LifecycleWrapped {
        plugin_type: PluginType,
        instance: Arc<Instance>,
        lifecycle: Lifecycle,
        inner: Box<DependencySource>,
    },
    /// Call a user factory.
    Lambda { plugin_type: PluginType, factory: LambdaFn },
    /// Call a constructor, then fill setters.
    Construct {
        plugin_type: PluginType,
        concrete: Arc<ConcreteType>,
        constructor: usize,
        arguments: Vec<(&'static str, DependencySource)>,
        setters: Vec<(usize, DependencySource)>,
        unmatched: Vec<Problem>,
        finish: FinishFn,
    },
    /// A configuration problem found while compiling.
    Problem { plugin_type: PluginType, problem: Problem },
}

impl DependencySource {
    /// The type of value this node produces.
    pub fn return_type(&self) -> &PluginType {
        match self {
            DependencySource::Constant { value_type, .. } => value_type,
            DependencySource::Referenced { plugin_type, .. }
            | DependencySource::AllPossibleOf { plugin_type }
            | DependencySource::LifecycleWrapped { plugin_type, .. }
            | DependencySource::Lambda { plugin_type, .. }
            | DependencySource::Construct { plugin_type, .. }
            | DependencySource::Problem { plugin_type, .. } => plugin_type,
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, DependencySource::Problem { .. })
    }

    /// Every problem in this tree, depth first.
    pub fn problems(&self) -> Vec<Problem> {
        let mut problems = Vec::new();
        self.collect_problems(&mut problems);
        problems
    }

    fn collect_problems(&self, into: &mut Vec<Problem>) {
        match self {
            DependencySource::Problem { problem, .. } => into.push(problem.clone()),
            DependencySource::LifecycleWrapped { inner, .. } => inner.collect_problems(into),
            DependencySource::Construct {
                arguments,
                setters,
                unmatched,
                ..
            } => {
                for (_, argument) in arguments {
                    argument.collect_problems(into);
                }
                for (_, setter) in setters {
                    setter.collect_problems(into);
                }
                into.extend(unmatched.iter().cloned());
            }
            _ => {}
        }
    }

    /// Human-readable rendering of the tree.
    pub fn describe(&self) -> String {
        match self {
            DependencySource::Constant { value_type, .. } => format!("Value of {}", value_type),
            DependencySource::Referenced { plugin_type, name: None } => format!("Default {}", plugin_type),
            DependencySource::Referenced {
                plugin_type,
                name: Some(name),
            } => format!("{} named '{}'", plugin_type, name),
            DependencySource::AllPossibleOf { plugin_type } => format!("All of {}", plugin_type),
            DependencySource::LifecycleWrapped {
                lifecycle,
                instance,
                inner,
                ..
            } => format!("{} '{}': {}", lifecycle, instance.name(), inner.describe()),
            DependencySource::Lambda { plugin_type, .. } => format!("Factory for {}", plugin_type),
            DependencySource::Construct {
                concrete,
                arguments,
                setters,
                ..
            } => {
                let arguments: Vec<String> = arguments
                    .iter()
                    .map(|(name, source)| format!("{}: {}", name, source.describe()))
                    .collect();
                let mut text = format!("new {}({})", concrete.name(), arguments.join(", "));
                if !setters.is_empty() {
                    let setters: Vec<String> = setters
                        .iter()
                        .map(|(index, source)| {
                            let name = concrete.setters().get(*index).map_or("?", |s| s.name());
                            format!("{} = {}", name, source.describe())
                        })
                        .collect();
                    text.push_str(&format!(" {{ {} }}", setters.join(", ")));
                }
                text
            }
            DependencySource::Problem { problem, .. } => format!("Problem: {}", problem.description),
        }
    }
}

impl std::fmt::Debug for DependencySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
