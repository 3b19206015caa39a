//! Plugin types and the erased object representation.
//!
//! A [`PluginType`] identifies the abstraction being requested from the
//! container. It may be a concrete type or a trait object (`dyn Trait`);
//! identity is always the [`TypeId`].

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::instance::Instance;
use crate::introspection::Pluggable;

/// Type-erased value stored in caches and passed between build plans.
///
/// The payload is always an `Arc<T>` for the plugin type `T`, so sized and
/// unsized plugin types share one storage form.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Wraps a typed value into an [`Object`].
pub fn wrap<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Object {
    Arc::new(value)
}

/// Recovers the typed value from an [`Object`] created by [`wrap`].
pub fn downcast<T: ?Sized + Send + Sync + 'static>(object: &Object) -> Option<Arc<T>> {
    object.downcast_ref::<Arc<T>>().cloned()
}

/// Identity of a requested abstraction.
///
/// # Examples
///
/// ```rust
/// use structuremap::PluginType;
///
/// trait Logger: Send + Sync {}
///
/// let logger = PluginType::of::<dyn Logger>();
/// assert!(logger.is::<dyn Logger>());
/// assert!(logger.name().contains("Logger"));
/// assert_ne!(logger, PluginType::of::<String>());
/// ```
#[derive(Clone)]
pub struct PluginType {
    id: TypeId,
    name: &'static str,
    auto: Option<fn() -> Instance>,
    shape: Option<Arc<GenericShape>>,
}

impl PluginType {
    /// Plugin type for any `'static` type, sized or not.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            auto: None,
            shape: None,
        }
    }

    /// Plugin type for a [`Pluggable`] concrete type. The container can
    /// register such a type on first request without explicit configuration.
    pub fn pluggable<T: Pluggable>() -> Self {
        Self {
            auto: Some(Instance::constructed::<T, T>),
            ..Self::of::<T>()
        }
    }

    /// Plugin type for a closed generic, carrying its template and type
    /// arguments so a registered template can close it.
    pub fn closed<T: ClosedGeneric + ?Sized>() -> Self {
        Self {
            shape: Some(Arc::new(GenericShape {
                template: T::template(),
                arguments: T::type_arguments(),
                close: T::close,
            })),
            ..Self::of::<T>()
        }
    }

    /// A closed generic that is also a concrete [`Pluggable`] type.
    pub fn closed_pluggable<T: ClosedGeneric + Pluggable>() -> Self {
        Self {
            auto: Some(Instance::constructed::<T, T>),
            ..Self::closed::<T>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this plugin type is `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn shape(&self) -> Option<&GenericShape> {
        self.shape.as_deref()
    }

    /// Whether the container can build this type without registration.
    pub fn is_auto_registrable(&self) -> bool {
        self.auto.is_some()
    }

    /// The instance used when this type registers itself.
    pub(crate) fn auto_instance(&self) -> Option<Instance> {
        self.auto.map(|make| make())
    }
}

impl PartialEq for PluginType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PluginType {}

impl Hash for PluginType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginType").field(&self.name).finish()
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Template name and type arguments of a closed generic type.
#[derive(Debug, Clone)]
pub struct GenericShape {
    template: &'static str,
    arguments: Vec<PluginType>,
    close: fn(&str) -> Option<Instance>,
}

impl GenericShape {
    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn arguments(&self) -> &[PluginType] {
        &self.arguments
    }

    pub fn argument(&self, index: usize) -> Option<&PluginType> {
        self.arguments.get(index)
    }

    /// The closed type's instance for the named implementation.
    pub fn close(&self, implementation: &str) -> Option<Instance> {
        (self.close)(implementation)
    }
}

/// Describes a closed generic type so that an open template registered with
/// [`Registry::for_generic`](crate::Registry::for_generic) can close it.
///
/// The impl is generic over the type arguments, so [`close`](Self::close) is
/// monomorphized for every closed type requested. A template registered with
/// [`add_implementation`](crate::GenericExpression::add_implementation) asks it
/// for an instance by implementation name, which closes the template for type
/// arguments that were never registered one by one.
///
/// # Examples
///
/// ```rust
/// use structuremap::{ClosedGeneric, Describe, Instance, Pluggable, PluginType, Plugs};
/// use std::marker::PhantomData;
/// use std::sync::Arc;
///
/// trait Repository<T>: Send + Sync {}
///
/// struct MemoryRepository<T>(PhantomData<fn() -> T>);
/// impl<T: 'static> Repository<T> for MemoryRepository<T> {}
/// impl<T: 'static> Pluggable for MemoryRepository<T> {
///     fn describe(d: &mut Describe<Self>) {
///         d.constructor(|_| Ok(MemoryRepository(PhantomData)));
///     }
/// }
/// impl<T: 'static> Plugs<dyn Repository<T>> for MemoryRepository<T> {
///     fn plug(self: Arc<Self>) -> Arc<dyn Repository<T>> { self }
/// }
///
/// impl<T: 'static> ClosedGeneric for dyn Repository<T> {
///     fn template() -> &'static str { "Repository" }
///     fn type_arguments() -> Vec<PluginType> { vec![PluginType::of::<T>()] }
///     fn close(implementation: &str) -> Option<Instance> {
///         match implementation {
///             "memory" => Some(Instance::constructed::<dyn Repository<T>, MemoryRepository<T>>()),
///             _ => None,
///         }
///     }
/// }
///
/// let closed = PluginType::closed::<dyn Repository<u32>>();
/// let shape = closed.shape().unwrap();
/// assert_eq!(shape.template(), "Repository");
/// assert!(shape.argument(0).unwrap().is::<u32>());
/// assert!(shape.close("memory").is_some());
/// assert!(shape.close("sql").is_none());
/// ```
pub trait ClosedGeneric: 'static {
    fn template() -> &'static str;
    fn type_arguments() -> Vec<PluginType>;

    /// The instance that implementation `implementation` provides for this
    /// closed type, if it has one.
    fn close(_implementation: &str) -> Option<Instance> {
        None
    }
}

/// Conversion from a concrete type to the plugin type it is registered for.
///
/// Every type plugs into itself. Use [`plugs!`](crate::plugs) to declare that
/// a concrete type can be served as a trait object.
pub trait Plugs<P: ?Sized>: Send + Sync + 'static {
    fn plug(self: Arc<Self>) -> Arc<P>;
}

impl<T: Send + Sync + 'static> Plugs<T> for T {
    fn plug(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Declares that a concrete type can be served as one or more trait objects.
///
/// ```rust
/// use structuremap::{plugs, Plugs};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// trait Named: Send + Sync { fn name(&self) -> &str; }
///
/// struct English;
/// impl Greeter for English { fn greet(&self) -> String { "hello".into() } }
/// impl Named for English { fn name(&self) -> &str { "en" } }
///
/// plugs!(English => dyn Greeter, dyn Named);
///
/// let greeter: Arc<dyn Greeter> = Plugs::<dyn Greeter>::plug(Arc::new(English));
/// assert_eq!(greeter.greet(), "hello");
/// ```
#[macro_export]
macro_rules! plugs {
    ($concrete:ty => $($plugin:ty),+ $(,)?) => {
        $(
            impl $crate::Plugs<$plugin> for $concrete {
                fn plug(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$plugin> {
                    self
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {
        fn sides(&self) -> u32;
    }

    struct Square;

    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    crate::plugs!(Square => dyn Shape);

    #[test]
    fn objects_round_trip_for_unsized_types() {
        let shape: Arc<dyn Shape> = Arc::new(Square);
        let object = wrap(shape.clone());
        let back = downcast::<dyn Shape>(&object).unwrap();
        assert!(Arc::ptr_eq(&shape, &back));
        assert!(downcast::<Square>(&object).is_none());
    }

    #[test]
    fn identity_ignores_hooks() {
        struct Holder;
        assert_eq!(PluginType::of::<Holder>(), PluginType::of::<Holder>());
        assert!(!PluginType::of::<Holder>().is_auto_registrable());
    }

    #[test]
    fn concrete_types_plug_into_trait_objects() {
        let plugged = Plugs::<dyn Shape>::plug(Arc::new(Square));
        assert_eq!(plugged.sides(), 4);
    }
}
