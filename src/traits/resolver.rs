//! Resolver traits for instance resolution.

use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};
use crate::introspection::Pluggable;
use crate::plugin_type::{downcast, ClosedGeneric, Object, PluginType};

/// Core resolver trait for untyped resolution.
///
/// Implemented by [`Container`](crate::Container) and by
/// [`BuildSession`](crate::BuildSession), the handle factories receive while
/// a build is in progress. Resolving through a session keeps the build stack,
/// so cycles that pass through factories are still detected.
///
/// Most users should use the [`Resolver`] trait instead, which provides typed
/// methods built on top of this trait.
pub trait ResolverCore {
    /// Resolves the named instance of `plugin_type`, or its default instance
    /// when `name` is `None`.
    ///
    /// # Returns
    ///
    /// * `Ok(Object)` - The value, holding an `Arc` of the plugin type
    /// * `Err(ContainerError)` - Missing family or instance, or a build failure
    fn resolve_object(&self, plugin_type: &PluginType, name: Option<&str>) -> ContainerResult<Object>;

    /// Like [`resolve_object`](Self::resolve_object), but a missing family or
    /// instance yields `Ok(None)`. Failures while building still propagate.
    fn try_resolve_object(&self, plugin_type: &PluginType, name: Option<&str>) -> ContainerResult<Option<Object>>;

    /// Resolves every registered instance of `plugin_type` in registration
    /// order, each through its own lifecycle. A missing family yields an
    /// empty list.
    fn resolve_all_objects(&self, plugin_type: &PluginType) -> ContainerResult<Vec<Object>>;
}

fn typed<T: ?Sized + Send + Sync + 'static>(object: Object) -> ContainerResult<Arc<T>> {
    downcast::<T>(&object).ok_or(ContainerError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}

/// Typed resolution interface.
///
/// # Examples
///
/// ```
/// use structuremap::{Registry, Resolver};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, msg: &str) -> String;
/// }
///
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {
///     fn log(&self, msg: &str) -> String {
///         format!("LOG: {}", msg)
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.for_type::<usize>().use_value(Arc::new(42));
/// registry
///     .for_type::<dyn Logger>()
///     .use_value(Arc::new(ConsoleLogger) as Arc<dyn Logger>);
///
/// let container = registry.build();
///
/// let number = container.get_required::<usize>();
/// assert_eq!(*number, 42);
///
/// let logger = container.get_instance::<dyn Logger>().unwrap();
/// assert_eq!(logger.log("resolved"), "LOG: resolved");
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves the default instance of `T`.
    fn get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        typed(self.resolve_object(&PluginType::of::<T>(), None)?)
    }

    /// Resolves the instance of `T` registered under `name`.
    fn get_named_instance<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        typed(self.resolve_object(&PluginType::of::<T>(), Some(name))?)
    }

    /// Resolves the default instance of `T`, or `None` when nothing is
    /// registered for it.
    fn try_get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Option<Arc<T>>> {
        self.try_resolve_object(&PluginType::of::<T>(), None)?
            .map(typed::<T>)
            .transpose()
    }

    /// Resolves the instance of `T` named `name`, or `None` when there is no
    /// such instance.
    fn try_get_named_instance<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Option<Arc<T>>> {
        self.try_resolve_object(&PluginType::of::<T>(), Some(name))?
            .map(typed::<T>)
            .transpose()
    }

    /// Resolves every registered instance of `T` in registration order.
    fn get_all_instances<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.resolve_all_objects(&PluginType::of::<T>())?
            .into_iter()
            .map(typed::<T>)
            .collect()
    }

    /// Resolves a concrete type, registering it on first use when automatic
    /// registration is enabled.
    fn get_concrete<T: Pluggable>(&self) -> ContainerResult<Arc<T>> {
        typed(self.resolve_object(&PluginType::pluggable::<T>(), None)?)
    }

    /// Resolves a closed generic type, closing a registered open template on
    /// first use.
    fn get_closed<T: ClosedGeneric + ?Sized + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        typed(self.resolve_object(&PluginType::closed::<T>(), None)?)
    }

    /// Resolves a closed generic concrete type, which a template registered
    /// with `use_requested_type` can build directly.
    fn get_closed_concrete<T: ClosedGeneric + Pluggable>(&self) -> ContainerResult<Arc<T>> {
        typed(self.resolve_object(&PluginType::closed_pluggable::<T>(), None)?)
    }

    /// Resolves an instance described by an explicit plugin type.
    fn get_instance_as<T: ?Sized + Send + Sync + 'static>(
        &self,
        plugin_type: &PluginType,
        name: Option<&str>,
    ) -> ContainerResult<Arc<T>> {
        typed(self.resolve_object(plugin_type, name)?)
    }

    /// Resolves the default instance of `T`, panicking on failure.
    fn get_required<T: ?Sized + Send + Sync + 'static>(&self) -> Arc<T> {
        self.get_instance::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", std::any::type_name::<T>(), e))
    }
}
