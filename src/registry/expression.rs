//! Fluent expressions returned by [`Registry`](super::Registry).

use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::BuildSession;
use crate::error::BoxError;
use crate::graph::{CloserFn, GenericTemplate, TemplateCloser};
use crate::instance::{Binding, Instance, InstanceId};
use crate::introspection::Pluggable;
use crate::lifecycle::Lifecycle;
use crate::plugin_type::{ClosedGeneric, GenericShape, PluginType, Plugs};

use super::FamilyConfig;

/// Configures the family of plugin type `P`.
///
/// `use_*` methods add an instance and make it the default; `add_*` methods
/// add an instance without changing the default.
pub struct FamilyExpression<'r, P: ?Sized> {
    family: &'r mut FamilyConfig,
    _plugin: PhantomData<fn(&P)>,
}

impl<'r, P: ?Sized + Send + Sync + 'static> FamilyExpression<'r, P> {
    pub(crate) fn new(family: &'r mut FamilyConfig) -> Self {
        Self {
            family,
            _plugin: PhantomData,
        }
    }

    /// Sets the lifecycle for instances that do not choose their own.
    pub fn lifecycle_is(self, lifecycle: Lifecycle) -> Self {
        self.family.lifecycle = Some(lifecycle);
        self
    }

    pub fn singleton(self) -> Self {
        self.lifecycle_is(Lifecycle::Singleton)
    }

    pub fn transient(self) -> Self {
        self.lifecycle_is(Lifecycle::Transient)
    }

    pub fn thread_local(self) -> Self {
        self.lifecycle_is(Lifecycle::ThreadLocal)
    }

    pub fn context_scoped(self) -> Self {
        self.lifecycle_is(Lifecycle::Context)
    }

    pub fn hybrid(self) -> Self {
        self.lifecycle_is(Lifecycle::Hybrid)
    }

    pub fn container_scoped(self) -> Self {
        self.lifecycle_is(Lifecycle::ContainerScoped)
    }

    /// Builds `C` by default.
    pub fn use_type<C: Pluggable + Plugs<P>>(self) -> InstanceExpression<'r> {
        self.use_instance(Instance::constructed::<P, C>())
    }

    /// Serves `value` by default.
    pub fn use_value(self, value: Arc<P>) -> InstanceExpression<'r> {
        self.use_instance(Instance::object(value))
    }

    /// Calls `factory` by default.
    pub fn use_factory<F>(self, factory: F) -> InstanceExpression<'r>
    where
        F: Fn(&BuildSession<'_>) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        self.use_instance(Instance::lambda(factory))
    }

    /// Makes the instance named `name` the default.
    pub fn use_named(self, name: impl Into<String>) -> InstanceExpression<'r> {
        self.use_instance(Instance::referenced::<P>(name))
    }

    /// Adds `instance` and makes it the default.
    pub fn use_instance(self, instance: Instance) -> InstanceExpression<'r> {
        let family = self.family;
        family.default = Some(instance.id());
        family.push(instance)
    }

    pub fn add_type<C: Pluggable + Plugs<P>>(self) -> InstanceExpression<'r> {
        self.add(Instance::constructed::<P, C>())
    }

    pub fn add_value(self, value: Arc<P>) -> InstanceExpression<'r> {
        self.add(Instance::object(value))
    }

    pub fn add_factory<F>(self, factory: F) -> InstanceExpression<'r>
    where
        F: Fn(&BuildSession<'_>) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        self.add(Instance::lambda(factory))
    }

    /// Adds a prepared instance. Instances for another plugin type are
    /// rejected when the container is built.
    pub fn add(self, instance: Instance) -> InstanceExpression<'r> {
        self.family.push(instance)
    }

    /// Synthesizes an instance when a name that was never registered is
    /// requested. The synthesized instance takes the requested name.
    pub fn missing_named_instance_is<F>(self, policy: F) -> Self
    where
        F: Fn(&str) -> Option<Instance> + Send + Sync + 'static,
    {
        self.family.missing_named = Some(Arc::new(policy));
        self
    }
}

/// Refines one registered instance.
pub struct InstanceExpression<'r> {
    instance: &'r mut Instance,
}

impl<'r> InstanceExpression<'r> {
    pub(crate) fn new(instance: &'r mut Instance) -> Self {
        Self { instance }
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id()
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.instance.set_name(name);
        self
    }

    /// Overrides the family lifecycle for this instance.
    pub fn lifecycle_is(self, lifecycle: Lifecycle) -> Self {
        self.instance.set_lifecycle(lifecycle);
        self
    }

    pub fn singleton(self) -> Self {
        self.lifecycle_is(Lifecycle::Singleton)
    }

    /// Supplies a fixed value for a constructor parameter.
    pub fn ctor_value<V: Send + Sync + 'static>(self, argument: impl Into<String>, value: V) -> Self {
        self.instance.bind_argument(argument, Binding::value(value));
        self
    }

    /// Satisfies a constructor parameter with the instance named `name`.
    pub fn ctor_named(self, argument: impl Into<String>, name: impl Into<String>) -> Self {
        self.instance.bind_argument(argument, Binding::Named(name.into()));
        self
    }

    /// Satisfies a constructor parameter with an instance built only for it.
    pub fn ctor_instance(self, argument: impl Into<String>, instance: Instance) -> Self {
        self.instance.bind_argument(argument, Binding::Inline(Arc::new(instance)));
        self
    }

    pub fn setter_value<V: Send + Sync + 'static>(self, setter: impl Into<String>, value: V) -> Self {
        self.instance.bind_setter(setter, Binding::value(value));
        self
    }

    pub fn setter_named(self, setter: impl Into<String>, name: impl Into<String>) -> Self {
        self.instance.bind_setter(setter, Binding::Named(name.into()));
        self
    }

    pub fn setter_instance(self, setter: impl Into<String>, instance: Instance) -> Self {
        self.instance.bind_setter(setter, Binding::Inline(Arc::new(instance)));
        self
    }
}

/// Configures an open generic template.
///
/// A closed type is requested with [`Resolver::get_closed`](crate::Resolver::get_closed)
/// or a `closed` constructor parameter. The first request for each set of
/// type arguments closes the template into a family of its own.
///
/// # Examples
///
/// ```rust
/// use structuremap::{ClosedGeneric, Describe, Instance, Pluggable, PluginType, Plugs, Registry, Resolver};
/// use std::marker::PhantomData;
/// use std::sync::Arc;
///
/// trait Repository<T>: Send + Sync {
///     fn entity(&self) -> &'static str;
/// }
///
/// struct MemoryRepository<T>(PhantomData<fn() -> T>);
///
/// impl<T: 'static> Repository<T> for MemoryRepository<T> {
///     fn entity(&self) -> &'static str { std::any::type_name::<T>() }
/// }
///
/// impl<T: 'static> Pluggable for MemoryRepository<T> {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|_| Ok(MemoryRepository(PhantomData)));
///     }
/// }
///
/// impl<T: 'static> Plugs<dyn Repository<T>> for MemoryRepository<T> {
///     fn plug(self: Arc<Self>) -> Arc<dyn Repository<T>> { self }
/// }
///
/// impl<T: 'static> ClosedGeneric for dyn Repository<T> {
///     fn template() -> &'static str { "Repository" }
///     fn type_arguments() -> Vec<PluginType> { vec![PluginType::of::<T>()] }
///     fn close(implementation: &str) -> Option<Instance> {
///         (implementation == "memory")
///             .then(Instance::constructed::<dyn Repository<T>, MemoryRepository<T>>)
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.for_generic("Repository").singleton().add_implementation("memory");
///
/// let container = registry.build();
/// assert_eq!(container.get_closed::<dyn Repository<u32>>().unwrap().entity(), "u32");
/// assert_eq!(container.get_closed::<dyn Repository<String>>().unwrap().entity(), "alloc::string::String");
/// ```
pub struct GenericExpression<'r> {
    template: &'r mut GenericTemplate,
}

impl<'r> GenericExpression<'r> {
    pub(crate) fn new(template: &'r mut GenericTemplate) -> Self {
        Self { template }
    }

    /// Builds the requested closed type itself, when it is a concrete
    /// `Pluggable` type.
    pub fn use_requested_type(self) -> Self {
        self.template.closers.push(TemplateCloser::Requested);
        self
    }

    /// Closes every requested type with the implementation its
    /// [`ClosedGeneric::close`] provides under `implementation`. The closed
    /// instance is named after the implementation.
    pub fn add_implementation(self, implementation: &'static str) -> Self {
        self.template.closers.push(TemplateCloser::Implementation(implementation));
        self
    }

    /// Adds a closure that picks an instance for a requested closed type.
    pub fn add_closer<F>(self, closer: F) -> Self
    where
        F: Fn(&PluginType, &GenericShape) -> Option<Instance> + Send + Sync + 'static,
    {
        let closer: CloserFn = Arc::new(closer);
        self.template.closers.push(TemplateCloser::Closer(closer));
        self
    }

    /// Closes requests for `P` with the concrete type `C`.
    pub fn close_for<P, C>(self) -> Self
    where
        P: ClosedGeneric + ?Sized + Send + Sync,
        C: Pluggable + Plugs<P>,
    {
        self.add_closer(|requested: &PluginType, _: &GenericShape| {
            requested.is::<P>().then(Instance::constructed::<P, C>)
        })
    }

    pub fn lifecycle_is(self, lifecycle: Lifecycle) -> Self {
        self.template.lifecycle = Some(lifecycle);
        self
    }

    pub fn singleton(self) -> Self {
        self.lifecycle_is(Lifecycle::Singleton)
    }
}
