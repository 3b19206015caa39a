//! Error types for the container.

use std::fmt;

use thiserror::Error;

/// Boxed error returned by user constructors and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A configuration problem found while compiling a build plan.
///
/// Problems are collected as data instead of being raised, so a single
/// diagnostic pass can report every misconfiguration in the graph.
///
/// # Examples
///
/// ```rust
/// use structuremap::Problem;
///
/// let problem = Problem::new("app::Mailer ('default') -> parameter 'host'", "a value must be supplied");
/// assert_eq!(
///     problem.to_string(),
///     "app::Mailer ('default') -> parameter 'host': a value must be supplied"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Problem {
    /// Where in the graph the problem was found.
    pub location: String,
    /// What is wrong.
    pub description: String,
}

impl Problem {
    pub fn new(location: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.description)
    }
}

fn list_problems(problems: &[Problem]) -> String {
    problems
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised by the container.
///
/// # Examples
///
/// ```rust
/// use structuremap::{ContainerError, Registry, Resolver};
///
/// struct Unregistered;
///
/// let container = Registry::new().build();
/// match container.get_instance::<Unregistered>() {
///     Err(ContainerError::MissingPluginFamily(name)) => assert!(name.ends_with("Unregistered")),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No family is registered for the plugin type and no policy supplied one.
    #[error("no plugin family is registered for {0}")]
    MissingPluginFamily(&'static str),
    /// The family exists but has no instance under the requested name.
    #[error("{plugin_type} has no instance named '{name}'")]
    UnresolvableInstance {
        plugin_type: &'static str,
        name: String,
    },
    /// One or more configuration problems, reported together.
    #[error("{} configuration problem(s) found:\n{}", .0.len(), list_problems(.0))]
    ConfigurationProblem(Vec<Problem>),
    /// Executing a build plan failed.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// A resolved value was not of the requested type.
    #[error("resolved value is not a {expected}")]
    TypeMismatch { expected: &'static str },
    /// The container was disposed before the call.
    #[error("the container has been disposed")]
    Disposed,
    /// Container configuration could not be read.
    #[error("invalid container configuration: {0}")]
    InvalidConfig(String),
}

impl ContainerError {
    /// True when the error is a bi-directional dependency.
    pub fn is_cycle(&self) -> bool {
        matches!(
            self,
            ContainerError::Build(BuildError {
                failure: BuildFailure::CycleDetected(_),
                ..
            })
        )
    }

    /// True for the two "nothing to resolve" errors that `try_*` calls map to `None`.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            ContainerError::MissingPluginFamily(_) | ContainerError::UnresolvableInstance { .. }
        )
    }
}

/// A failure while executing a build plan, with the chain of instances that
/// were being built when it happened.
///
/// # Examples
///
/// ```rust
/// use structuremap::{BuildError, BuildFailure};
///
/// let error = BuildError::new(
///     vec!["app::Service ('default')".into(), "app::Repo ('default')".into()],
///     BuildFailure::DepthExceeded(8),
/// );
/// assert_eq!(
///     error.to_string(),
///     "building app::Service ('default') required building app::Repo ('default'), \
///      which failed: maximum build depth of 8 exceeded"
/// );
/// ```
#[derive(Debug, Error)]
#[error("{}{failure}", describe_path(.path))]
pub struct BuildError {
    /// Instance descriptions from the root request to the failure point.
    pub path: Vec<String>,
    #[source]
    pub failure: BuildFailure,
}

impl BuildError {
    pub fn new(path: Vec<String>, failure: BuildFailure) -> Self {
        Self { path, failure }
    }
}

fn describe_path(path: &[String]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("building {}, which failed: ", path.join(" required building "))
    }
}

/// Why a build plan failed.
#[derive(Debug, Error)]
pub enum BuildFailure {
    /// An instance already on the build stack was requested again.
    #[error("bi-directional dependency detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),
    /// The plan was compiled with unresolved configuration problems.
    #[error("the build plan has {} unresolved problem(s):\n{}", .0.len(), list_problems(.0))]
    Problems(Vec<Problem>),
    /// A user constructor or factory returned an error.
    #[error("{0}")]
    Constructor(#[source] BoxError),
    /// A user constructor, factory, or setter panicked.
    #[error("constructor panicked: {0}")]
    Panicked(String),
    /// The constructed value could not be converted to the plugin type.
    #[error("the constructed value is not a {0}")]
    TypeMismatch(&'static str),
    /// The build stack grew past the configured maximum.
    #[error("maximum build depth of {0} exceeded")]
    DepthExceeded(usize),
    /// A dependency could not be resolved while the plan ran.
    #[error("{0}")]
    Dependency(#[source] Box<ContainerError>),
    /// A context-scoped instance was requested without an active context.
    #[error("{0} is context scoped but no context is active")]
    NoActiveContext(&'static str),
}

/// Error raised when a constructor reads its arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("no argument named '{0}' was supplied")]
    Missing(String),
    #[error("argument '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
