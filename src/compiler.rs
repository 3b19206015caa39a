//! Compiles instances into cached, reusable build plans.
//!
//! Compilation has two steps. The instance is first turned into a
//! [`DependencySource`] tree, with every configuration problem recorded as a
//! `Problem` node instead of being raised. The tree is then turned into
//! nested closures. A plan whose tree has problems fails with all of them
//! when executed; compilation itself never fails.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::container::BuildSession;
use crate::dependency::DependencySource;
use crate::error::{BoxError, BuildFailure, ContainerError, ContainerResult, Problem};
use crate::config::NamedFallback;
use crate::graph::{PluginFamily, PluginGraph};
use crate::instance::{Binding, FinishFn, Instance, InstanceKind};
use crate::internal::{panic_message, FrameKey};
use crate::introspection::{Arguments, ConcreteType, Parameter, ParameterKind};
use crate::lifecycle::Lifecycle;
use crate::plugin_type::{wrap, Object, PluginType};
use crate::traits::{Dispose, ResolverCore};

/// A value produced by a build plan, with its disposer when it has one.
pub struct Built {
    pub object: Object,
    pub disposable: Option<Arc<dyn Dispose>>,
}

type BuildFn = Arc<dyn Fn(&BuildSession<'_>) -> ContainerResult<Built> + Send + Sync>;

/// A compiled, reusable recipe for one instance.
pub struct BuildPlan {
    instance: Arc<Instance>,
    lifecycle: Lifecycle,
    source: DependencySource,
    run: BuildFn,
}

impl BuildPlan {
    /// Runs the plan inside `session`.
    pub fn execute(&self, session: &BuildSession<'_>) -> ContainerResult<Built> {
        (self.run)(session)
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn source(&self) -> &DependencySource {
        &self.source
    }

    pub fn problems(&self) -> Vec<Problem> {
        self.source.problems()
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }
}

impl std::fmt::Debug for BuildPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPlan")
            .field("instance", &self.instance.name())
            .field("lifecycle", &self.lifecycle)
            .field("source", &self.source)
            .finish()
    }
}

/// Turns instances into build plans against one plugin graph.
pub struct PlanCompiler<'g> {
    graph: &'g PluginGraph,
    inspecting: bool,
}

impl<'g> PlanCompiler<'g> {
    pub fn new(graph: &'g PluginGraph) -> Self {
        Self { graph, inspecting: false }
    }

    /// A compiler that leaves the graph as it is. Families are only looked
    /// up, never created, and no missing-family policy, template closer or
    /// missing-named-instance policy runs. Dependencies that one of those
    /// could supply at run time are compiled as plain references.
    pub fn inspecting(graph: &'g PluginGraph) -> Self {
        Self { graph, inspecting: true }
    }

    /// The family for `plugin_type`, or `None` when inspection has to leave
    /// it to run time.
    fn family_for(&self, plugin_type: &PluginType) -> ContainerResult<Option<Arc<PluginFamily>>> {
        if self.inspecting {
            self.graph.peek_family(plugin_type)
        } else {
            self.graph.find_family(plugin_type).map(Some)
        }
    }

    fn check_named(&self, family: &PluginFamily, name: &str) -> ContainerResult<()> {
        let fallbacks = &self.graph.config().named_fallbacks;
        if !self.inspecting {
            return family.find_instance(Some(name), fallbacks).map(|_| ());
        }
        let passive: Vec<NamedFallback> = fallbacks
            .iter()
            .copied()
            .filter(|fallback| *fallback != NamedFallback::Policy)
            .collect();
        match family.find_instance(Some(name), &passive) {
            Err(_) if family.has_missing_named_policy() && fallbacks.contains(&NamedFallback::Policy) => Ok(()),
            found => found.map(|_| ()),
        }
    }

    /// Compiles `instance`, which lives under `lifecycle`.
    pub fn compile(&self, instance: &Arc<Instance>, lifecycle: Lifecycle) -> BuildPlan {
        let source = self.source_for(instance, lifecycle);
        let problems = source.problems();
        let run = if problems.is_empty() {
            to_build_fn(&source)
        } else {
            tracing::debug!(
                instance = instance.name(),
                problems = problems.len(),
                "compiled build plan with problems"
            );
            problem_fn(instance, problems)
        };
        BuildPlan {
            instance: instance.clone(),
            lifecycle,
            source,
            run,
        }
    }

    /// The source tree for `instance`, wrapped in its lifecycle.
    pub fn source_for(&self, instance: &Arc<Instance>, lifecycle: Lifecycle) -> DependencySource {
        DependencySource::LifecycleWrapped {
            plugin_type: instance.plugin_type().clone(),
            instance: instance.clone(),
            lifecycle,
            inner: Box::new(self.inner_source(instance)),
        }
    }

    fn inner_source(&self, instance: &Arc<Instance>) -> DependencySource {
        let plugin_type = instance.plugin_type().clone();
        match instance.kind() {
            InstanceKind::Object(object) => DependencySource::Constant {
                value_type: plugin_type,
                value: object.clone(),
            },
            InstanceKind::Lambda(factory) => DependencySource::Lambda {
                plugin_type,
                factory: factory.clone(),
            },
            InstanceKind::Referenced(target) => self.reference(&plugin_type, target, location_of(instance)),
            InstanceKind::Constructed {
                concrete,
                describe,
                finish,
                ..
            } => {
                let concrete = self.graph.catalog().get_or_describe(*concrete, *describe);
                self.construct(instance, concrete, *finish)
            }
        }
    }

    fn reference(&self, plugin_type: &PluginType, name: &str, at: String) -> DependencySource {
        let found = match self.family_for(plugin_type) {
            Ok(Some(family)) => self.check_named(&family, name),
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        match found {
            Ok(_) => DependencySource::Referenced {
                plugin_type: plugin_type.clone(),
                name: Some(name.to_string()),
            },
            Err(err) => problem(plugin_type, at, err.to_string()),
        }
    }

    fn construct(&self, instance: &Arc<Instance>, concrete: Arc<ConcreteType>, finish: FinishFn) -> DependencySource {
        let plugin_type = instance.plugin_type().clone();
        let location = location_of(instance);

        if concrete.constructors().is_empty() {
            return problem(
                &plugin_type,
                location,
                format!("{} does not declare a constructor", concrete.name()),
            );
        }

        let candidates: Vec<Vec<(&'static str, DependencySource)>> = concrete
            .constructors()
            .iter()
            .map(|ctor| {
                ctor.params()
                    .iter()
                    .map(|param| {
                        let source = self.parameter(&location, "constructor parameter", param, instance.argument(param.name));
                        (param.name, source)
                    })
                    .collect()
            })
            .collect();

        // Preferred, else greediest satisfiable, else greediest
        let satisfiable = |args: &Vec<(&'static str, DependencySource)>| {
            args.iter().all(|(_, source)| source.problems().is_empty())
        };
        let chosen = concrete
            .constructors()
            .iter()
            .position(|ctor| ctor.is_preferred())
            .or_else(|| greediest(candidates.iter().enumerate().filter(|(_, args)| satisfiable(*args))))
            .or_else(|| greediest(candidates.iter().enumerate()))
            .unwrap_or(0);
        let params = concrete.constructors()[chosen].params();
        let arguments = candidates.into_iter().nth(chosen).unwrap_or_default();

        let mut unmatched: Vec<Problem> = instance
            .arguments()
            .iter()
            .filter(|(name, _)| !params.iter().any(|param| param.name == name))
            .map(|(name, _)| {
                Problem::new(
                    location.clone(),
                    format!("{} constructor #{} has no parameter named '{}'", concrete.name(), chosen, name),
                )
            })
            .collect();

        let mut setters = Vec::new();
        for (index, setter) in concrete.setters().iter().enumerate() {
            match instance.setter(setter.name()) {
                Some(binding) => setters.push((index, self.parameter(&location, "setter", setter.param(), Some(binding)))),
                None if setter.is_required() => setters.push((index, self.parameter(&location, "setter", setter.param(), None))),
                None => {
                    let source = self.parameter(&location, "setter", setter.param(), None);
                    if !source.is_problem() {
                        setters.push((index, source));
                    }
                }
            }
        }
        unmatched.extend(
            instance
                .setters()
                .iter()
                .filter(|(name, _)| !concrete.setters().iter().any(|s| s.name() == name))
                .map(|(name, _)| Problem::new(location.clone(), format!("{} has no setter named '{}'", concrete.name(), name))),
        );

        DependencySource::Construct {
            plugin_type,
            concrete,
            constructor: chosen,
            arguments,
            setters,
            unmatched,
            finish,
        }
    }

    fn parameter(&self, location: &str, role: &str, param: &Parameter, binding: Option<&Binding>) -> DependencySource {
        let at = format!("{} -> {} '{}'", location, role, param.name);
        let plugin_type = &param.plugin_type;
        match binding {
            Some(Binding::Value { object, value_type }) => {
                if param.kind == ParameterKind::AllOf {
                    problem(plugin_type, at, "a collection parameter cannot take a single value".to_string())
                } else if value_type != plugin_type {
                    problem(
                        plugin_type,
                        at,
                        format!("expected a value of type {} but the supplied value is a {}", plugin_type, value_type),
                    )
                } else {
                    DependencySource::Constant {
                        value_type: value_type.clone(),
                        value: object.clone(),
                    }
                }
            }
            Some(Binding::Named(name)) => {
                if param.kind == ParameterKind::AllOf {
                    problem(plugin_type, at, "a collection parameter cannot take a named instance".to_string())
                } else {
                    self.reference(plugin_type, name, at)
                }
            }
            Some(Binding::Inline(inline)) => {
                if inline.plugin_type() != plugin_type {
                    problem(
                        plugin_type,
                        at,
                        format!("expected an instance of {} but the inline instance builds {}", plugin_type, inline.plugin_type()),
                    )
                } else {
                    self.source_for(inline, inline.lifecycle().unwrap_or_default())
                }
            }
            None => match param.kind {
                ParameterKind::Value => problem(plugin_type, at, format!("a value of type {} must be supplied", plugin_type)),
                ParameterKind::AllOf => DependencySource::AllPossibleOf {
                    plugin_type: plugin_type.clone(),
                },
                ParameterKind::Dependency => match self.family_for(plugin_type) {
                    Ok(None) => DependencySource::Referenced {
                        plugin_type: plugin_type.clone(),
                        name: None,
                    },
                    Ok(Some(family)) if family.default_instance().is_some() => DependencySource::Referenced {
                        plugin_type: plugin_type.clone(),
                        name: None,
                    },
                    Ok(Some(family)) if family.is_empty() => {
                        problem(plugin_type, at, format!("no instances are registered for {}", plugin_type))
                    }
                    Ok(Some(family)) => problem(
                        plugin_type,
                        at,
                        format!("{} has {} instances and no default", plugin_type, family.len()),
                    ),
                    Err(err) => problem(plugin_type, at, err.to_string()),
                },
            },
        }
    }
}

fn problem(plugin_type: &PluginType, at: String, description: String) -> DependencySource {
    DependencySource::Problem {
        plugin_type: plugin_type.clone(),
        problem: Problem::new(at, description),
    }
}

fn location_of(instance: &Instance) -> String {
    format!("{} ('{}')", instance.plugin_type().name(), instance.name())
}

/// Index of the candidate with the most parameters; the first one wins ties.
fn greediest<'a, I>(candidates: I) -> Option<usize>
where
    I: Iterator<Item = (usize, &'a Vec<(&'static str, DependencySource)>)>,
{
    let mut best: Option<(usize, usize)> = None;
    for (index, args) in candidates {
        if best.map_or(true, |(_, len)| args.len() > len) {
            best = Some((index, args.len()));
        }
    }
    best.map(|(index, _)| index)
}

fn frame_of(plugin_type: &PluginType, instance: &Instance) -> (FrameKey, Arc<str>) {
    (
        (plugin_type.id(), instance.id()),
        Arc::from(location_of(instance)),
    )
}

fn problem_fn(instance: &Arc<Instance>, problems: Vec<Problem>) -> BuildFn {
    let (frame, description) = frame_of(instance.plugin_type(), instance);
    Arc::new(move |session: &BuildSession<'_>| {
        let _frame = session.enter(frame, &description)?;
        Err(session.fail(BuildFailure::Problems(problems.clone())))
    })
}

/// Runs user code, mapping its errors and panics onto build failures.
/// Container errors raised by nested resolutions pass through unchanged.
fn run_user<T>(session: &BuildSession<'_>, f: impl FnOnce() -> Result<T, BoxError>) -> ContainerResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(match error.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(error) => session.fail(BuildFailure::Constructor(error)),
        }),
        Err(payload) => Err(session.fail(BuildFailure::Panicked(panic_message(payload.as_ref())))),
    }
}

/// Puts a dependency's resolution error on the current build path. Errors
/// that already carry a path are returned as they are.
fn in_path(session: &BuildSession<'_>, err: ContainerError) -> ContainerError {
    match err {
        ContainerError::Build(_) => err,
        other => session.fail(BuildFailure::Dependency(Box::new(other))),
    }
}

fn to_build_fn(source: &DependencySource) -> BuildFn {
    match source {
        DependencySource::Constant { value, .. } => {
            let value = value.clone();
            Arc::new(move |_: &BuildSession<'_>| {
                Ok(Built {
                    object: value.clone(),
                    disposable: None,
                })
            })
        }
        DependencySource::Referenced { plugin_type, name } => {
            let plugin_type = plugin_type.clone();
            let name = name.clone();
            Arc::new(move |session: &BuildSession<'_>| {
                let object = session
                    .resolve_object(&plugin_type, name.as_deref())
                    .map_err(|err| in_path(session, err))?;
                Ok(Built { object, disposable: None })
            })
        }
        DependencySource::AllPossibleOf { plugin_type } => {
            let plugin_type = plugin_type.clone();
            Arc::new(move |session: &BuildSession<'_>| {
                let objects = session
                    .resolve_all_objects(&plugin_type)
                    .map_err(|err| in_path(session, err))?;
                Ok(Built {
                    object: wrap(Arc::new(objects)),
                    disposable: None,
                })
            })
        }
        DependencySource::LifecycleWrapped {
            plugin_type,
            instance,
            lifecycle,
            inner,
        } => {
            let inner = to_build_fn(inner);
            let (frame, description) = frame_of(plugin_type, instance);
            let key = CacheKey::new(frame.0, frame.1);
            let plugin_type = plugin_type.clone();
            let instance = instance.clone();
            let lifecycle = *lifecycle;
            Arc::new(move |session: &BuildSession<'_>| {
                let _frame = session.enter(frame, &description)?;
                let cache = lifecycle
                    .scope()
                    .find_cache(session.container(), &plugin_type)
                    .map_err(|failure| session.fail(failure))?;
                match cache {
                    Some(cache) => {
                        let object = cache.get_or_build(key, &description, || {
                            match session.root_home(lifecycle, &plugin_type, &instance) {
                                Some(root) => session.within(&root, |root_session| inner(root_session)),
                                None => inner(session),
                            }
                        })?;
                        Ok(Built { object, disposable: None })
                    }
                    None => inner(session),
                }
            })
        }
        DependencySource::Lambda { factory, .. } => {
            let factory = factory.clone();
            Arc::new(move |session: &BuildSession<'_>| {
                let object = run_user(session, || factory(session))?;
                Ok(Built { object, disposable: None })
            })
        }
        DependencySource::Construct {
            plugin_type,
            concrete,
            constructor,
            arguments,
            setters,
            finish,
            ..
        } => {
            let arguments: Vec<(&'static str, BuildFn)> = arguments
                .iter()
                .map(|(name, source)| (*name, to_build_fn(source)))
                .collect();
            let setters: Vec<(usize, BuildFn)> = setters
                .iter()
                .map(|(index, source)| (*index, to_build_fn(source)))
                .collect();
            let concrete = concrete.clone();
            let constructor = *constructor;
            let finish = *finish;
            let expected = plugin_type.name();
            Arc::new(move |session: &BuildSession<'_>| {
                let mut values = Vec::with_capacity(arguments.len());
                for (name, build) in &arguments {
                    values.push((*name, build(session)?.object));
                }
                let ctor = &concrete.constructors()[constructor];
                let mut raw = run_user(session, || ctor.invoke(&Arguments::new(&values)))?;
                for (index, build) in &setters {
                    let value = build(session)?.object;
                    let setter = &concrete.setters()[*index];
                    run_user(session, || setter.apply(&mut raw, &value))?;
                }
                finish(raw, concrete.dispose_cast()).ok_or_else(|| session.fail(BuildFailure::TypeMismatch(expected)))
            })
        }
        DependencySource::Problem { problem, .. } => {
            let problem = problem.clone();
            Arc::new(move |session: &BuildSession<'_>| Err(session.fail(BuildFailure::Problems(vec![problem.clone()]))))
        }
    }
}
