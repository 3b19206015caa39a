//! Registry modules for grouping registrations.

use crate::error::ContainerResult;

use super::Registry;

/// A reusable group of registrations.
///
/// # Example
///
/// ```rust
/// use structuremap::{ContainerResult, Registry, RegistryModule, RegistryModuleExt, Resolver};
/// use std::sync::Arc;
///
/// struct StorageSettings { root: String }
///
/// struct StorageModule;
///
/// impl RegistryModule for StorageModule {
///     fn register(self, registry: &mut Registry) -> ContainerResult<()> {
///         registry
///             .for_type::<StorageSettings>()
///             .singleton()
///             .use_value(Arc::new(StorageSettings { root: "/var/data".into() }));
///         Ok(())
///     }
/// }
///
/// # fn main() -> ContainerResult<()> {
/// let container = Registry::new().add_module(StorageModule)?.build();
/// assert_eq!(container.get_instance::<StorageSettings>()?.root, "/var/data");
/// # Ok(())
/// # }
/// ```
pub trait RegistryModule {
    /// Adds this module's registrations to `registry`.
    fn register(self, registry: &mut Registry) -> ContainerResult<()>;
}

/// Module registration by value, for building a registry in one chain.
pub trait RegistryModuleExt {
    fn add_module<M: RegistryModule>(self, module: M) -> ContainerResult<Self>
    where
        Self: Sized;
}

impl RegistryModuleExt for Registry {
    fn add_module<M: RegistryModule>(mut self, module: M) -> ContainerResult<Self> {
        module.register(&mut self)?;
        Ok(self)
    }
}

/// Module registration in place.
pub trait RegistryModuleMutExt {
    fn add_module_mut<M: RegistryModule>(&mut self, module: M) -> ContainerResult<&mut Self>;
}

impl RegistryModuleMutExt for Registry {
    fn add_module_mut<M: RegistryModule>(&mut self, module: M) -> ContainerResult<&mut Self> {
        module.register(self)?;
        Ok(self)
    }
}

/// Any closure over a registry is a module.
impl<F> RegistryModule for F
where
    F: FnOnce(&mut Registry) -> ContainerResult<()>,
{
    fn register(self, registry: &mut Registry) -> ContainerResult<()> {
        self(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContainerError;
    use crate::traits::Resolver;
    use std::sync::Arc;

    #[test]
    fn closures_are_modules() {
        let mut registry = Registry::new();
        registry
            .add_module_mut(|r: &mut Registry| -> ContainerResult<()> {
                r.for_type::<u8>().use_value(Arc::new(8));
                Ok(())
            })
            .unwrap();
        assert_eq!(*registry.build().get_instance::<u8>().unwrap(), 8);
    }

    #[test]
    fn module_errors_stop_the_chain() {
        let failed = Registry::new()
            .add_module(|_: &mut Registry| -> ContainerResult<()> {
                Err(ContainerError::InvalidConfig("bad module".into()))
            })
            .and_then(|r| r.add_module(|_: &mut Registry| -> ContainerResult<()> { Ok(()) }));
        assert!(matches!(failed, Err(ContainerError::InvalidConfig(_))));
    }
}
