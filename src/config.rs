//! Flat key/value configuration, read once at construction.
//!
//! Properties come from explicit entries and from process environment
//! variables carrying the `TRACEWEAVE_` prefix, with later sources
//! overriding earlier ones. Typed keys are validated when the [`Config`] is
//! built, so the typed getters afterwards are infallible and fall back to
//! their documented defaults for absent keys.

use std::collections::HashMap;
use thiserror::Error;

/// Environment variable prefix mapped onto property keys.
///
/// `TRACEWEAVE_EXECUTORS_ALL_ENABLED` becomes `executors.all.enabled`.
pub const ENV_PREFIX: &str = "TRACEWEAVE_";

/// Property keys understood by the runtime.
pub mod keys {
    /// Master switch for building and exporting spans.
    pub const TRACE_ENABLED: &str = "trace.enabled";
    /// Whether every executor participates in task wrapping by default.
    pub const EXECUTORS_ALL_ENABLED: &str = "executors.all.enabled";
    /// Comma-separated executor type names always wrapped.
    pub const EXECUTORS_INCLUDE: &str = "executors.include";
    /// Comma-separated executor type-name prefixes never wrapped.
    pub const EXECUTORS_EXCLUDE_PREFIXES: &str = "executors.exclude.prefixes";
    /// Bounded capacity of the finished-span export queue.
    pub const EXPORT_QUEUE_CAPACITY: &str = "export.queue.capacity";
}

const DEFAULT_EXPORT_QUEUE_CAPACITY: u64 = 1024;

/// A configuration value failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The value is not a recognised boolean.
    #[error("invalid boolean for {key}: {value:?} (expected true/false/1/0)")]
    InvalidBool {
        /// The offending property key.
        key: String,
        /// The rejected raw value.
        value: String,
    },
    /// The value is not an unsigned integer.
    #[error("invalid integer for {key}: {value:?}")]
    InvalidInteger {
        /// The offending property key.
        key: String,
        /// The rejected raw value.
        value: String,
    },
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Immutable property store with typed getters.
#[derive(Clone, Debug, Default)]
pub struct Config {
    properties: HashMap<String, String>,
}

impl Config {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Returns the raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns a comma-separated key as trimmed, non-empty items.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map_or_else(Vec::new, |value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(parse_bool).unwrap_or(default)
    }

    /// Whether spans are built and exported at all.
    #[must_use]
    pub fn trace_enabled(&self) -> bool {
        self.bool_or(keys::TRACE_ENABLED, true)
    }

    /// Whether executors are wrapped unless excluded.
    #[must_use]
    pub fn executors_all_enabled(&self) -> bool {
        self.bool_or(keys::EXECUTORS_ALL_ENABLED, true)
    }

    /// Executor type names always wrapped, overriding exclusions.
    #[must_use]
    pub fn executors_include(&self) -> Vec<String> {
        self.list(keys::EXECUTORS_INCLUDE)
    }

    /// Executor type-name prefixes never wrapped.
    #[must_use]
    pub fn executors_exclude_prefixes(&self) -> Vec<String> {
        self.list(keys::EXECUTORS_EXCLUDE_PREFIXES)
    }

    /// Capacity of the bounded export queue.
    #[must_use]
    pub fn export_queue_capacity(&self) -> usize {
        self.get(keys::EXPORT_QUEUE_CAPACITY)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_EXPORT_QUEUE_CAPACITY) as usize
    }
}

/// Accumulates property sources and validates typed keys.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    properties: HashMap<String, String>,
}

impl ConfigBuilder {
    /// Sets one property, overriding any earlier source.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Loads every `TRACEWEAVE_`-prefixed environment variable, mapping
    /// underscores in the remainder to dots and lowercasing it.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        for (name, value) in std::env::vars() {
            if let Some(suffix) = name.strip_prefix(ENV_PREFIX) {
                if suffix.is_empty() {
                    continue;
                }
                let key = suffix.to_ascii_lowercase().replace('_', ".");
                self.properties.insert(key, value);
            }
        }
        self
    }

    /// Validates the typed keys and freezes the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        for key in [keys::TRACE_ENABLED, keys::EXECUTORS_ALL_ENABLED] {
            if let Some(value) = self.properties.get(key) {
                if parse_bool(value).is_none() {
                    return Err(ConfigError::InvalidBool {
                        key: key.to_string(),
                        value: value.clone(),
                    });
                }
            }
        }
        if let Some(value) = self.properties.get(keys::EXPORT_QUEUE_CAPACITY) {
            if value.trim().parse::<u64>().is_err() {
                return Err(ConfigError::InvalidInteger {
                    key: keys::EXPORT_QUEUE_CAPACITY.to_string(),
                    value: value.clone(),
                });
            }
        }
        Ok(Config {
            properties: self.properties,
        })
    }
}
