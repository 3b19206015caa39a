//! Registration-time descriptions of concrete types.
//!
//! A concrete type opts into construction by the container by implementing
//! [`Pluggable`]. Its `describe` function lists the constructors it offers,
//! the parameters each one takes, the setters that may be filled after
//! construction, and whether built values need disposal.

mod arguments;
mod catalog;

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub use arguments::Arguments;
pub use catalog::TypeCatalog;

use crate::error::{ArgumentError, BoxError};
use crate::plugin_type::{downcast, ClosedGeneric, Object, PluginType};
use crate::traits::Dispose;

/// A freshly constructed concrete value, before it is shared.
pub type RawObject = Box<dyn Any + Send + Sync>;

pub(crate) type CtorFn = Arc<dyn Fn(&Arguments<'_>) -> Result<RawObject, BoxError> + Send + Sync>;
pub(crate) type SetterFn = Arc<dyn Fn(&mut RawObject, &Object) -> Result<(), BoxError> + Send + Sync>;
pub type DisposeCast = fn(Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Dispose>>;

/// A concrete type the container can construct.
///
/// # Examples
///
/// ```rust
/// use structuremap::{Describe, Pluggable, Registry, Resolver};
/// use std::sync::Arc;
///
/// struct Settings {
///     url: String,
/// }
///
/// struct Client {
///     settings: Arc<Settings>,
///     retries: u32,
/// }
///
/// impl Pluggable for Client {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|args| {
///             Ok(Client {
///                 settings: args.get::<Settings>("settings")?,
///                 retries: args.value::<u32>("retries")?,
///             })
///         })
///         .dependency::<Settings>("settings")
///         .value::<u32>("retries");
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry
///     .for_type::<Settings>()
///     .use_value(Arc::new(Settings { url: "http://localhost".into() }));
/// registry.for_type::<Client>().use_type::<Client>().ctor_value("retries", 3u32);
///
/// let client = registry.build().get_instance::<Client>().unwrap();
/// assert_eq!(client.retries, 3);
/// assert_eq!(client.settings.url, "http://localhost");
/// ```
pub trait Pluggable: Send + Sync + Sized + 'static {
    fn describe(d: &mut Describe<Self>);
}

/// How a parameter is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ParameterKind {
    /// A single instance of the parameter's plugin type.
    Dependency,
    /// Every registered instance of the parameter's plugin type.
    AllOf,
    /// A primitive value that must be supplied explicitly.
    Value,
}

/// A named constructor parameter or setter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub plugin_type: PluginType,
    pub kind: ParameterKind,
}

/// One way of constructing a concrete type.
#[derive(Clone)]
pub struct Constructor {
    index: usize,
    params: Vec<Parameter>,
    preferred: bool,
    invoke: CtorFn,
}

impl Constructor {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn is_preferred(&self) -> bool {
        self.preferred
    }

    pub(crate) fn invoke(&self, arguments: &Arguments<'_>) -> Result<RawObject, BoxError> {
        (self.invoke)(arguments)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("index", &self.index)
            .field("params", &self.params)
            .field("preferred", &self.preferred)
            .finish()
    }
}

/// A property filled after construction.
#[derive(Clone)]
pub struct Setter {
    param: Parameter,
    required: bool,
    apply: SetterFn,
}

impl Setter {
    pub fn param(&self) -> &Parameter {
        &self.param
    }

    pub fn name(&self) -> &'static str {
        self.param.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn apply(&self, target: &mut RawObject, value: &Object) -> Result<(), BoxError> {
        (self.apply)(target, value)
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("param", &self.param)
            .field("required", &self.required)
            .finish()
    }
}

/// Everything the container knows about a concrete type.
#[derive(Clone)]
pub struct ConcreteType {
    id: TypeId,
    name: &'static str,
    constructors: Vec<Constructor>,
    setters: Vec<Setter>,
    dispose: Option<DisposeCast>,
}

impl ConcreteType {
    /// Runs `T::describe` and collects the result.
    pub fn of<T: Pluggable>() -> Self {
        let mut describe = Describe::<T>::new();
        T::describe(&mut describe);
        ConcreteType {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            constructors: describe.constructors,
            setters: describe.setters,
            dispose: describe.dispose,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    pub fn setters(&self) -> &[Setter] {
        &self.setters
    }

    pub fn is_disposable(&self) -> bool {
        self.dispose.is_some()
    }

    pub(crate) fn dispose_cast(&self) -> Option<DisposeCast> {
        self.dispose
    }
}

impl fmt::Debug for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcreteType")
            .field("name", &self.name)
            .field("constructors", &self.constructors)
            .field("setters", &self.setters)
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

/// Collects the description of `T` inside [`Pluggable::describe`].
pub struct Describe<T> {
    constructors: Vec<Constructor>,
    setters: Vec<Setter>,
    dispose: Option<DisposeCast>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pluggable> Describe<T> {
    fn new() -> Self {
        Self {
            constructors: Vec::new(),
            setters: Vec::new(),
            dispose: None,
            _marker: PhantomData,
        }
    }

    /// Declares a constructor. Chain the returned spec to list its parameters
    /// in the order the closure reads them.
    pub fn constructor<F>(&mut self, f: F) -> ConstructorSpec<'_>
    where
        F: Fn(&Arguments<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let index = self.constructors.len();
        self.constructors.push(Constructor {
            index,
            params: Vec::new(),
            preferred: false,
            invoke: Arc::new(move |args: &Arguments<'_>| f(args).map(|value| Box::new(value) as RawObject)),
        });
        ConstructorSpec {
            constructor: &mut self.constructors[index],
        }
    }

    /// Declares an optional setter for a dependency of type `D`.
    pub fn setter<D, F>(&mut self, name: &'static str, f: F) -> SetterSpec<'_>
    where
        D: ?Sized + Send + Sync + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        self.push_setter(
            Parameter {
                name,
                plugin_type: PluginType::of::<D>(),
                kind: ParameterKind::Dependency,
            },
            move |target: &mut T, value: &Object| {
                let value = downcast::<D>(value).ok_or_else(|| mismatch::<D>(name))?;
                f(target, value);
                Ok(())
            },
        )
    }

    /// Declares an optional setter for a concrete dependency that may be
    /// registered automatically.
    pub fn setter_pluggable<D, F>(&mut self, name: &'static str, f: F) -> SetterSpec<'_>
    where
        D: Pluggable,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        let mut spec = self.setter::<D, F>(name, f);
        spec.setter.param.plugin_type = PluginType::pluggable::<D>();
        spec
    }

    /// Declares a setter for a primitive value. Value setters are only filled
    /// when a value is supplied, unless marked required.
    pub fn setter_value<V, F>(&mut self, name: &'static str, f: F) -> SetterSpec<'_>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.push_setter(
            Parameter {
                name,
                plugin_type: PluginType::of::<V>(),
                kind: ParameterKind::Value,
            },
            move |target: &mut T, value: &Object| {
                let value = downcast::<V>(value).ok_or_else(|| mismatch::<V>(name))?;
                f(target, (*value).clone());
                Ok(())
            },
        )
    }

    /// Marks built values as needing disposal.
    pub fn disposable(&mut self)
    where
        T: Dispose,
    {
        self.dispose = Some(cast_dispose::<T>);
    }

    fn push_setter<F>(&mut self, param: Parameter, apply: F) -> SetterSpec<'_>
    where
        F: Fn(&mut T, &Object) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = param.name;
        let apply: SetterFn = Arc::new(move |raw: &mut RawObject, value: &Object| {
            let target = raw
                .downcast_mut::<T>()
                .ok_or_else(|| Box::new(mismatch::<T>(name)) as BoxError)?;
            apply(target, value)
        });
        let index = self.setters.len();
        self.setters.push(Setter {
            param,
            required: false,
            apply,
        });
        SetterSpec {
            setter: &mut self.setters[index],
        }
    }
}

fn mismatch<D: ?Sized>(name: &'static str) -> ArgumentError {
    ArgumentError::TypeMismatch {
        name: name.to_string(),
        expected: std::any::type_name::<D>(),
    }
}

fn cast_dispose<T: Dispose>(value: Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Dispose>> {
    value.downcast::<T>().ok().map(|value| value as Arc<dyn Dispose>)
}

/// Builder for a constructor's parameter list.
pub struct ConstructorSpec<'a> {
    constructor: &'a mut Constructor,
}

impl<'a> ConstructorSpec<'a> {
    fn param(mut self, name: &'static str, plugin_type: PluginType, kind: ParameterKind) -> Self {
        self.constructor.params.push(Parameter { name, plugin_type, kind });
        self
    }

    /// A dependency resolved from the family of `D`.
    pub fn dependency<D: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.param(name, PluginType::of::<D>(), ParameterKind::Dependency)
    }

    /// A concrete dependency that may be registered automatically.
    pub fn pluggable<D: Pluggable>(self, name: &'static str) -> Self {
        self.param(name, PluginType::pluggable::<D>(), ParameterKind::Dependency)
    }

    /// A closed generic dependency that a registered template may close.
    pub fn closed<D: ClosedGeneric + ?Sized + Send + Sync>(self, name: &'static str) -> Self {
        self.param(name, PluginType::closed::<D>(), ParameterKind::Dependency)
    }

    /// Every registered instance of `D`, read with [`Arguments::all`].
    pub fn all<D: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.param(name, PluginType::of::<D>(), ParameterKind::AllOf)
    }

    /// A primitive value, read with [`Arguments::value`].
    pub fn value<V: Clone + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.param(name, PluginType::of::<V>(), ParameterKind::Value)
    }

    /// A dependency on an explicit plugin type.
    pub fn with_type(self, name: &'static str, plugin_type: PluginType, kind: ParameterKind) -> Self {
        self.param(name, plugin_type, kind)
    }

    /// Selects this constructor regardless of how many parameters other
    /// constructors take.
    pub fn preferred(mut self) -> Self {
        self.constructor.preferred = true;
        self
    }
}

/// Builder for a setter declaration.
pub struct SetterSpec<'a> {
    setter: &'a mut Setter,
}

impl SetterSpec<'_> {
    /// The setter must be filled; an unresolvable required setter is a
    /// configuration problem.
    pub fn required(mut self) -> Self {
        self.setter.required = true;
        self
    }
}
