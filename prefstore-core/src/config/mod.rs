//! Configuration management for prefstore
//!
//! Covers how attribute keys are namespaced, the limits the reference store
//! enforces, and logging. Values come from defaults, a TOML file, or
//! `PREFSTORE_*` environment variables.

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

mod error;

pub use error::ConfigError;

/// Main runtime configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key namespacing
    pub namespace: NamespaceConfig,

    /// Reference store limits
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// How container prefixes and attribute names are joined into keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Placed between the container prefix and the attribute name
    pub separator: String,
}

/// Limits applied by [`MemoryStore`](crate::store::MemoryStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest accepted serialized value, in bytes
    pub max_value_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            separator: "::".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_value_bytes: 4 * 1024 * 1024, // 4 MiB
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    raw.trim().parse().map_err(|e: std::str::ParseBoolError| ConfigError::InvalidEnv {
        var,
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Recognised variables:
    /// - `PREFSTORE_NAMESPACE_SEPARATOR`
    /// - `PREFSTORE_STORE_MAX_VALUE_BYTES`
    /// - `PREFSTORE_LOG_LEVEL`
    /// - `PREFSTORE_LOG_JSON`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(separator) = lookup("PREFSTORE_NAMESPACE_SEPARATOR") {
            config.namespace.separator = separator;
        }

        if let Some(max) = lookup("PREFSTORE_STORE_MAX_VALUE_BYTES") {
            config.store.max_value_bytes =
                max.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidEnv {
                        var: "PREFSTORE_STORE_MAX_VALUE_BYTES",
                        reason: e.to_string(),
                    }
                })?;
        }

        if let Some(level) = lookup("PREFSTORE_LOG_LEVEL") {
            config.logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = lookup("PREFSTORE_LOG_JSON") {
            config.logging.json_format = parse_flag("PREFSTORE_LOG_JSON", &json)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing sections keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.separator.is_empty() {
            return Err(ConfigError::Validation(
                "namespace separator must not be empty".to_string(),
            ));
        }

        if self.store.max_value_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_value_bytes must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
