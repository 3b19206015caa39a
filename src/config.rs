//! Container configuration.
//!
//! Settings come from [`Default`], from `STRUCTUREMAP_*` environment variables
//! or, with the `config` feature, from JSON. Install them with
//! [`Registry::with_config`](crate::Registry::with_config).

use std::env;
use std::str::FromStr;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{ContainerError, ContainerResult};

/// Where a request for an unregistered instance name goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum NamedFallback {
    /// The family's missing-named-instance policy.
    Policy,
    /// The family's default instance.
    Default,
}

impl FromStr for NamedFallback {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "policy" => Ok(NamedFallback::Policy),
            "default" => Ok(NamedFallback::Default),
            other => Err(ContainerError::InvalidConfig(format!("unknown named fallback '{}'", other))),
        }
    }
}

/// A cache the hybrid lifecycle may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum HybridScope {
    Context,
    ThreadLocal,
}

impl FromStr for HybridScope {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "context" => Ok(HybridScope::Context),
            "thread_local" | "threadlocal" | "thread" => Ok(HybridScope::ThreadLocal),
            other => Err(ContainerError::InvalidConfig(format!("unknown hybrid scope '{}'", other))),
        }
    }
}

/// Container-wide settings.
///
/// # Examples
///
/// ```rust
/// use structuremap::{ContainerConfig, NamedFallback};
///
/// let config = ContainerConfig {
///     named_fallbacks: vec![NamedFallback::Default],
///     ..ContainerConfig::default()
/// };
/// assert!(config.auto_register_concrete);
/// assert_eq!(config.max_build_depth, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerConfig {
    /// Register concrete `Pluggable` types the first time they are requested.
    pub auto_register_concrete: bool,
    /// Fallbacks tried in order when a named instance is not registered.
    pub named_fallbacks: Vec<NamedFallback>,
    /// Caches the hybrid lifecycle tries in order.
    pub hybrid_order: Vec<HybridScope>,
    /// Deepest dependency chain a single resolve may build.
    pub max_build_depth: usize,
    /// Whether a nested container reuses transients within itself.
    pub cache_nested_transients: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            auto_register_concrete: true,
            named_fallbacks: vec![NamedFallback::Policy],
            hybrid_order: vec![HybridScope::Context, HybridScope::ThreadLocal],
            max_build_depth: 1024,
            cache_nested_transients: true,
        }
    }
}

impl ContainerConfig {
    /// Reads `STRUCTUREMAP_*` environment variables over the defaults.
    pub fn from_env() -> ContainerResult<Self> {
        Self::from_env_prefixed("STRUCTUREMAP")
    }

    /// Reads `<PREFIX>_*` environment variables over the defaults.
    ///
    /// Recognized keys: `AUTO_REGISTER_CONCRETE`, `NAMED_FALLBACKS`
    /// (comma separated), `HYBRID_ORDER` (comma separated), `MAX_BUILD_DEPTH`
    /// and `CACHE_NESTED_TRANSIENTS`.
    pub fn from_env_prefixed(prefix: &str) -> ContainerResult<Self> {
        let var = |key: &str| env::var(format!("{}_{}", prefix.to_uppercase(), key)).ok();
        let mut config = Self::default();

        if let Some(value) = var("AUTO_REGISTER_CONCRETE") {
            config.auto_register_concrete = parse_bool("AUTO_REGISTER_CONCRETE", &value)?;
        }
        if let Some(value) = var("NAMED_FALLBACKS") {
            config.named_fallbacks = parse_list(&value)?;
        }
        if let Some(value) = var("HYBRID_ORDER") {
            config.hybrid_order = parse_list(&value)?;
        }
        if let Some(value) = var("MAX_BUILD_DEPTH") {
            config.max_build_depth = value.trim().parse().map_err(|_| {
                ContainerError::InvalidConfig(format!("MAX_BUILD_DEPTH must be a number, got '{}'", value))
            })?;
        }
        if let Some(value) = var("CACHE_NESTED_TRANSIENTS") {
            config.cache_nested_transients = parse_bool("CACHE_NESTED_TRANSIENTS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> ContainerResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ContainerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no container can run with.
    pub fn validate(&self) -> ContainerResult<()> {
        if self.max_build_depth == 0 {
            return Err(ContainerError::InvalidConfig("max_build_depth must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> ContainerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ContainerError::InvalidConfig(format!("{} must be a boolean, got '{}'", key, value))),
    }
}

fn parse_list<T: FromStr<Err = ContainerError>>(value: &str) -> ContainerResult<Vec<T>> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}
