//! # structuremap
//!
//! An in-process inversion-of-control container that resolves object graphs
//! from registered plugin families, compiles a reusable build plan per
//! instance, and runs it under the instance's lifecycle.
//!
//! ## Features
//!
//! - **Plugin families**: every abstraction (a concrete type or a `dyn Trait`)
//!   has a family of named instances with an optional default
//! - **Build plans**: constructor and setter selection happens once per
//!   instance; configuration problems are collected, not raised one by one
//! - **Lifecycles**: Transient, Singleton, ThreadLocal, Context, Hybrid and
//!   ContainerScoped
//! - **Nested containers**: fresh transient and container-scoped caches over
//!   shared families and singletons
//! - **Open generics**: templates closed on demand per set of type arguments
//! - **Bi-directional dependency detection** with the full build path
//!
//! ## Quick Start
//!
//! ```rust
//! use structuremap::{plugs, Describe, Pluggable, Registry, Resolver};
//! use std::sync::Arc;
//!
//! trait Repository: Send + Sync {
//!     fn find(&self, id: u32) -> String;
//! }
//!
//! struct SqlRepository {
//!     url: String,
//! }
//!
//! impl Repository for SqlRepository {
//!     fn find(&self, id: u32) -> String {
//!         format!("{}/users/{}", self.url, id)
//!     }
//! }
//!
//! impl Pluggable for SqlRepository {
//!     fn describe(d: &mut Describe<Self>) {
//!         d.constructor(|args| Ok(SqlRepository { url: args.value::<String>("url")? }))
//!             .value::<String>("url");
//!     }
//! }
//!
//! plugs!(SqlRepository => dyn Repository);
//!
//! struct UserService {
//!     repository: Arc<dyn Repository>,
//! }
//!
//! impl Pluggable for UserService {
//!     fn describe(d: &mut Describe<Self>) {
//!         d.constructor(|args| Ok(UserService { repository: args.get::<dyn Repository>("repository")? }))
//!             .dependency::<dyn Repository>("repository");
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry
//!     .for_type::<dyn Repository>()
//!     .singleton()
//!     .use_type::<SqlRepository>()
//!     .ctor_value("url", "postgres://localhost".to_string());
//!
//! let container = registry.build();
//! let service = container.get_concrete::<UserService>().unwrap();
//! assert_eq!(service.repository.find(7), "postgres://localhost/users/7");
//! ```
//!
//! ## Lifecycles
//!
//! - **Transient**: built per request; cached per nested container inside one
//! - **Singleton**: built once for the root and all nested containers
//! - **ThreadLocal**: built once per OS thread
//! - **Context**: built once per [`ContextKey`], see [`Container::with_context`]
//! - **Hybrid**: Context when a context is active, otherwise ThreadLocal
//! - **ContainerScoped**: built once per container, root or nested
//!
//! ## Failures
//!
//! ```rust
//! use structuremap::{BuildFailure, ContainerError, Registry, Resolver};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Left;
//! struct Right;
//!
//! let mut registry = Registry::new();
//! registry.for_type::<Left>().use_factory(|s| {
//!     s.get_instance::<Right>()?;
//!     Ok(Arc::new(Left))
//! });
//! registry.for_type::<Right>().use_factory(|s| {
//!     s.get_instance::<Left>()?;
//!     Ok(Arc::new(Right))
//! });
//!
//! let err = registry.build().get_instance::<Left>().unwrap_err();
//! assert!(err.is_cycle());
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod container;
pub mod dependency;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod instance;
pub mod introspection;
pub mod lifecycle;
pub mod plugin_type;
pub mod registry;
pub mod traits;

mod internal;

pub use cache::{CacheKey, DisposalFailure, DisposalReport, ObjectCache};
pub use compiler::{BuildPlan, Built, PlanCompiler};
pub use config::{ContainerConfig, HybridScope, NamedFallback};
pub use container::{BuildSession, Container, ContextKey};
pub use dependency::DependencySource;
pub use diagnostics::{FamilyReport, GraphReport, InstanceReport};
pub use error::{ArgumentError, BoxError, BuildError, BuildFailure, ContainerError, ContainerResult, Problem};
pub use graph::{FamilyPolicy, GenericTemplate, PluginFamily, PluginGraph};
pub use instance::{Binding, Instance, InstanceId, DEFAULT};
pub use introspection::{
    Arguments, ConcreteType, Constructor, ConstructorSpec, Describe, Parameter, ParameterKind, Pluggable, Setter,
    SetterSpec, TypeCatalog,
};
pub use lifecycle::{Lifecycle, LifecycleScope};
pub use plugin_type::{downcast, wrap, ClosedGeneric, GenericShape, Object, PluginType, Plugs};
pub use registry::{
    FamilyExpression, GenericExpression, InstanceExpression, Registry, RegistryModule, RegistryModuleExt,
    RegistryModuleMutExt,
};
pub use traits::{Dispose, Resolver, ResolverCore};
