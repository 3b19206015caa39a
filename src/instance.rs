//! Instances: configured recipes for producing a value of a plugin type.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::compiler::Built;
use crate::container::BuildSession;
use crate::error::BoxError;
use crate::introspection::{ConcreteType, DisposeCast, Pluggable, RawObject};
use crate::lifecycle::Lifecycle;
use crate::plugin_type::{wrap, Object, PluginType, Plugs};

/// Name of the default instance of a family.
pub const DEFAULT: &str = "default";

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        InstanceId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type FinishFn = fn(RawObject, Option<DisposeCast>) -> Option<Built>;
pub type LambdaFn = Arc<dyn Fn(&BuildSession<'_>) -> Result<Object, BoxError> + Send + Sync>;

/// Converts a constructed `C` into the plugin type `P`, collecting its
/// disposer when the concrete type declared one.
fn finish<P, C>(raw: RawObject, dispose: Option<DisposeCast>) -> Option<Built>
where
    P: ?Sized + Send + Sync + 'static,
    C: Plugs<P>,
{
    let concrete: Arc<C> = Arc::new(*raw.downcast::<C>().ok()?);
    let disposable = dispose.and_then(|cast| cast(concrete.clone()));
    Some(Built {
        object: wrap(concrete.plug()),
        disposable,
    })
}

#[derive(Clone)]
pub(crate) enum InstanceKind {
    Constructed {
        concrete: TypeId,
        concrete_name: &'static str,
        describe: fn() -> ConcreteType,
        finish: FinishFn,
    },
    Object(Object),
    Lambda(LambdaFn),
    Referenced(String),
}

/// How an explicit constructor argument or setter is satisfied.
#[derive(Clone)]
pub enum Binding {
    /// A fixed value; its type must match the parameter.
    Value { object: Object, value_type: PluginType },
    /// The instance with this name in the parameter type's family.
    Named(String),
    /// An instance built only for this parameter.
    Inline(Arc<Instance>),
}

impl Binding {
    pub fn value<V: Send + Sync + 'static>(value: V) -> Self {
        Binding::Value {
            object: wrap(Arc::new(value)),
            value_type: PluginType::of::<V>(),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value { value_type, .. } => f.debug_tuple("Value").field(value_type).finish(),
            Binding::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Binding::Inline(instance) => f.debug_tuple("Inline").field(&instance.name).finish(),
        }
    }
}

/// A configured way of producing a value for a plugin type.
///
/// Instances are built with the typed constructors below and then handed to
/// a [`Registry`](crate::Registry) or [`PluginFamily`](crate::PluginFamily).
/// They are immutable once registered.
///
/// # Examples
///
/// ```rust
/// use structuremap::{Instance, Lifecycle, PluginType};
/// use std::sync::Arc;
///
/// let instance = Instance::object::<String>(Arc::new("hello".to_string()))
///     .named("greeting")
///     .with_lifecycle(Lifecycle::Singleton);
///
/// assert_eq!(instance.name(), "greeting");
/// assert_eq!(instance.plugin_type(), &PluginType::of::<String>());
/// assert_eq!(instance.lifecycle(), Some(Lifecycle::Singleton));
/// ```
pub struct Instance {
    id: InstanceId,
    name: String,
    plugin_type: PluginType,
    lifecycle: Option<Lifecycle>,
    kind: InstanceKind,
    arguments: Vec<(String, Binding)>,
    setters: Vec<(String, Binding)>,
}

impl Instance {
    fn new(plugin_type: PluginType, label: &'static str, kind: InstanceKind) -> Self {
        let id = InstanceId::next();
        Self {
            id,
            name: format!("{}#{}", label, id),
            plugin_type,
            lifecycle: None,
            kind,
            arguments: Vec::new(),
            setters: Vec::new(),
        }
    }

    /// Builds `C` through its [`Pluggable`] description and serves it as `P`.
    pub fn constructed<P, C>() -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        C: Pluggable + Plugs<P>,
    {
        let concrete_name = std::any::type_name::<C>();
        Self::new(
            PluginType::of::<P>(),
            concrete_name,
            InstanceKind::Constructed {
                concrete: TypeId::of::<C>(),
                concrete_name,
                describe: ConcreteType::of::<C>,
                finish: finish::<P, C>,
            },
        )
    }

    /// Always returns `value`.
    pub fn object<P: ?Sized + Send + Sync + 'static>(value: Arc<P>) -> Self {
        Self::new(
            PluginType::of::<P>(),
            std::any::type_name::<P>(),
            InstanceKind::Object(wrap(value)),
        )
    }

    /// Calls `factory` to produce the value. The factory resolves its own
    /// dependencies through the session it receives.
    pub fn lambda<P, F>(factory: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&BuildSession<'_>) -> Result<Arc<P>, BoxError> + Send + Sync + 'static,
    {
        let factory: LambdaFn = Arc::new(move |session: &BuildSession<'_>| factory(session).map(wrap::<P>));
        Self::new(
            PluginType::of::<P>(),
            std::any::type_name::<P>(),
            InstanceKind::Lambda(factory),
        )
    }

    /// Resolves the instance named `target` in the same family.
    pub fn referenced<P: ?Sized + Send + Sync + 'static>(target: impl Into<String>) -> Self {
        Self::new(
            PluginType::of::<P>(),
            std::any::type_name::<P>(),
            InstanceKind::Referenced(target.into()),
        )
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin_type(&self) -> &PluginType {
        &self.plugin_type
    }

    /// The lifecycle override, if any. Without one the family's lifecycle
    /// applies.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    pub(crate) fn kind(&self) -> &InstanceKind {
        &self.kind
    }

    pub fn arguments(&self) -> &[(String, Binding)] {
        &self.arguments
    }

    pub fn setters(&self) -> &[(String, Binding)] {
        &self.setters
    }

    pub(crate) fn argument(&self, name: &str) -> Option<&Binding> {
        self.arguments.iter().find(|(key, _)| key == name).map(|(_, binding)| binding)
    }

    pub(crate) fn setter(&self, name: &str) -> Option<&Binding> {
        self.setters.iter().find(|(key, _)| key == name).map(|(_, binding)| binding)
    }

    /// Name of the concrete type for constructed instances.
    pub fn concrete_name(&self) -> Option<&'static str> {
        match &self.kind {
            InstanceKind::Constructed { concrete_name, .. } => Some(*concrete_name),
            _ => None,
        }
    }

    /// One-line summary for diagnostics.
    pub fn description(&self) -> String {
        match &self.kind {
            InstanceKind::Constructed { concrete_name, .. } => format!("Constructed {}", concrete_name),
            InstanceKind::Object(_) => format!("Object {}", self.plugin_type.name()),
            InstanceKind::Lambda(_) => format!("Factory for {}", self.plugin_type.name()),
            InstanceKind::Referenced(target) => format!("Reference to '{}'", target),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.set_lifecycle(lifecycle);
        self
    }

    /// Supplies a fixed constructor argument.
    pub fn ctor_value<V: Send + Sync + 'static>(mut self, argument: impl Into<String>, value: V) -> Self {
        self.bind_argument(argument, Binding::value(value));
        self
    }

    /// Satisfies a constructor argument with a named instance of its type.
    pub fn ctor_named(mut self, argument: impl Into<String>, instance: impl Into<String>) -> Self {
        self.bind_argument(argument, Binding::Named(instance.into()));
        self
    }

    /// Satisfies a constructor argument with an inline instance.
    pub fn ctor_instance(mut self, argument: impl Into<String>, instance: Instance) -> Self {
        self.bind_argument(argument, Binding::Inline(Arc::new(instance)));
        self
    }

    pub fn setter_value<V: Send + Sync + 'static>(mut self, setter: impl Into<String>, value: V) -> Self {
        self.bind_setter(setter, Binding::value(value));
        self
    }

    pub fn setter_named(mut self, setter: impl Into<String>, instance: impl Into<String>) -> Self {
        self.bind_setter(setter, Binding::Named(instance.into()));
        self
    }

    pub fn setter_instance(mut self, setter: impl Into<String>, instance: Instance) -> Self {
        self.bind_setter(setter, Binding::Inline(Arc::new(instance)));
        self
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = Some(lifecycle);
    }

    pub(crate) fn bind_argument(&mut self, argument: impl Into<String>, binding: Binding) {
        bind(&mut self.arguments, argument.into(), binding);
    }

    pub(crate) fn bind_setter(&mut self, setter: impl Into<String>, binding: Binding) {
        bind(&mut self.setters, setter.into(), binding);
    }
}

fn bind(bindings: &mut Vec<(String, Binding)>, name: String, binding: Binding) {
    match bindings.iter_mut().find(|(key, _)| *key == name) {
        Some(slot) => slot.1 = binding,
        None => bindings.push((name, binding)),
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("plugin_type", &self.plugin_type)
            .field("lifecycle", &self.lifecycle)
            .field("description", &self.description())
            .field("arguments", &self.arguments)
            .field("setters", &self.setters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::Describe;

    struct Pump;

    impl Pluggable for Pump {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|_| Ok(Pump));
        }
    }

    #[test]
    fn unnamed_instances_get_unique_generated_names() {
        let first = Instance::constructed::<Pump, Pump>();
        let second = Instance::constructed::<Pump, Pump>();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.name(), second.name());
        assert!(first.name().ends_with(&format!("#{}", first.id())));
        assert_eq!(first.concrete_name(), Some(std::any::type_name::<Pump>()));
    }

    #[test]
    fn rebinding_replaces_the_earlier_binding() {
        let instance = Instance::constructed::<Pump, Pump>()
            .ctor_value("size", 1u8)
            .ctor_named("size", "big");
        assert_eq!(instance.arguments().len(), 1);
        assert!(matches!(instance.argument("size"), Some(Binding::Named(name)) if name == "big"));
    }

    #[test]
    fn finish_converts_to_the_plugin_type() {
        let built = finish::<Pump, Pump>(Box::new(Pump), None).unwrap();
        assert!(crate::plugin_type::downcast::<Pump>(&built.object).is_some());
        assert!(built.disposable.is_none());
        assert!(finish::<Pump, Pump>(Box::new(1u8), None).is_none());
    }
}
