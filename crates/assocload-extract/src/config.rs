//! Serializer configuration.
//!
//! Environment variables, on top of those read by `LoaderConfig`:
//!
//! - `ASSOCLOAD_JOIN_KEYS=composite|split` - how relation metadata is read
//! - `ASSOCLOAD_BATCHING=1|0` - batched or per-parent association loading

use assocload_core::{ConfigErrorKind, Error, JoinKeyStrategy, Result};
use assocload_loader::LoaderConfig;
use assocload_loader::config::parse_flag;
use std::env;

/// Configuration for a `Serializer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerConfig {
    /// Accessor style for join keys
    pub join_keys: JoinKeyStrategy,
    /// Batch association lookups (`false` loads per parent)
    pub batching: bool,
    /// Settings for each per-call registry
    pub loader: LoaderConfig,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            join_keys: JoinKeyStrategy::Composite,
            batching: true,
            loader: LoaderConfig::default(),
        }
    }
}

impl SerializerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_keys(mut self, strategy: JoinKeyStrategy) -> Self {
        self.join_keys = strategy;
        self
    }

    pub fn batching(mut self, enabled: bool) -> Self {
        self.batching = enabled;
        self
    }

    pub fn loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Build a configuration from defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from defaults overridden by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self {
            loader: LoaderConfig::from_lookup(&lookup)?,
            ..Self::default()
        };
        if let Some(raw) = lookup("ASSOCLOAD_JOIN_KEYS") {
            config.join_keys = raw.parse().map_err(|msg: String| {
                Error::config(
                    ConfigErrorKind::InvalidSetting,
                    format!("ASSOCLOAD_JOIN_KEYS: {msg}"),
                )
            })?;
        }
        if let Some(raw) = lookup("ASSOCLOAD_BATCHING") {
            config.batching = parse_flag("ASSOCLOAD_BATCHING", &raw)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SerializerConfig::default();
        assert_eq!(config.join_keys, JoinKeyStrategy::Composite);
        assert!(config.batching);
        assert_eq!(config.loader, LoaderConfig::default());
    }

    #[test]
    fn builder() {
        let config = SerializerConfig::new()
            .join_keys(JoinKeyStrategy::Split)
            .batching(false)
            .loader(LoaderConfig::new().max_force_depth(4));
        assert_eq!(config.join_keys, JoinKeyStrategy::Split);
        assert!(!config.batching);
        assert_eq!(config.loader.max_force_depth, 4);
    }

    #[test]
    fn from_lookup() {
        let config = SerializerConfig::from_lookup(|name| match name {
            "ASSOCLOAD_JOIN_KEYS" => Some("Split".to_string()),
            "ASSOCLOAD_BATCHING" => Some("no".to_string()),
            "ASSOCLOAD_DEGRADED_THRESHOLD" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.join_keys, JoinKeyStrategy::Split);
        assert!(!config.batching);
        assert_eq!(config.loader.degraded_threshold, 5);

        let err = SerializerConfig::from_lookup(|name| {
            (name == "ASSOCLOAD_JOIN_KEYS").then(|| "nested".to_string())
        })
        .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidSetting));
    }
}
