//! Loader configuration.
//!
//! Controls the forcing depth bound and batch tracking. Values can be set
//! with the builder methods or read from the environment:
//!
//! - `ASSOCLOAD_MAX_FORCE_DEPTH` - maximum nesting of deferred values
//! - `ASSOCLOAD_DEGRADED_THRESHOLD` - late reopenings per association before warning
//! - `ASSOCLOAD_TRACK_BATCHES=1|0` - enable or disable batch tracking

use assocload_core::{ConfigErrorKind, Error, Result};
use std::env;
use std::str::FromStr;

/// Default bound on nested deferred values.
pub const DEFAULT_MAX_FORCE_DEPTH: usize = 32;

/// Default number of late reopenings per association before warning.
pub const DEFAULT_DEGRADED_THRESHOLD: usize = 3;

/// Configuration for a `BatchRegistry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Maximum nesting of deferred values resolved by one force
    pub max_force_depth: usize,
    /// Late reopenings per association before a warning is logged
    pub degraded_threshold: usize,
    /// Whether batch resolutions are tracked per association
    pub track_batches: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_force_depth: DEFAULT_MAX_FORCE_DEPTH,
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
            track_batches: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting of deferred values.
    pub fn max_force_depth(mut self, depth: usize) -> Self {
        self.max_force_depth = depth;
        self
    }

    /// Set the degraded-coalescing warning threshold.
    pub fn degraded_threshold(mut self, threshold: usize) -> Self {
        self.degraded_threshold = threshold;
        self
    }

    /// Enable or disable batch tracking.
    pub fn track_batches(mut self, enabled: bool) -> Self {
        self.track_batches = enabled;
        self
    }

    /// Build a configuration from defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from defaults overridden by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup("ASSOCLOAD_MAX_FORCE_DEPTH") {
            config.max_force_depth = parse_setting("ASSOCLOAD_MAX_FORCE_DEPTH", &raw)?;
        }
        if let Some(raw) = lookup("ASSOCLOAD_DEGRADED_THRESHOLD") {
            config.degraded_threshold = parse_setting("ASSOCLOAD_DEGRADED_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("ASSOCLOAD_TRACK_BATCHES") {
            config.track_batches = parse_flag("ASSOCLOAD_TRACK_BATCHES", &raw)?;
        }
        Ok(config)
    }
}

/// Parse a numeric setting.
pub fn parse_setting<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        Error::config(
            ConfigErrorKind::InvalidSetting,
            format!("{name}: cannot parse '{raw}'"),
        )
    })
}

/// Parse a boolean flag (`1/true/yes/on` or `0/false/no/off`).
pub fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(
            ConfigErrorKind::InvalidSetting,
            format!("{name}: expected a boolean flag, got '{raw}'"),
        )),
    }
}
