//! Configuration for the conversation service.
//!
//! Values come from defaults overridden by `CONVERSATION_*` environment
//! variables. Call [`ServiceConfig::validate`] before use.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the HTTP port.
pub const PORT_ENV: &str = "CONVERSATION_PORT";
/// Environment variable selecting the storage backend.
pub const BACKEND_ENV: &str = "CONVERSATION_BACKEND";
/// Environment variable holding the `SQLite` database path.
pub const SQLITE_PATH_ENV: &str = "CONVERSATION_SQLITE_PATH";
/// Environment variable holding the per-operation storage deadline.
pub const OPERATION_TIMEOUT_ENV: &str = "CONVERSATION_OPERATION_TIMEOUT_MS";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
    /// Parsed values violate an invariant.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which storage backend holds conversations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local map; data is lost on restart.
    #[default]
    Memory,
    /// `SQLite` file.
    Sqlite,
}

impl StorageBackend {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("expected `memory` or `sqlite`, got `{other}`")),
        }
    }
}

/// Top-level service configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl ServiceConfig {
    /// Load from process environment on top of defaults.
    ///
    /// # Errors
    /// Returns an error if a variable is set but malformed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// # Errors
    /// Returns an error if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, PORT_ENV, |raw| {
            raw.parse::<u16>().map_err(|e| e.to_string())
        })? {
            config.server.port = port;
        }
        if let Some(backend) =
            parse_var(&lookup, BACKEND_ENV, |raw| raw.parse::<StorageBackend>())?
        {
            config.storage.backend = backend;
        }
        if let Some(path) = lookup(SQLITE_PATH_ENV) {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(timeout_ms) = parse_var(&lookup, OPERATION_TIMEOUT_ENV, |raw| {
            raw.parse::<u64>().map_err(|e| e.to_string())
        })? {
            config.storage.operation_timeout_ms = timeout_ms;
        }

        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.operation_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.sqlite_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(
                "storage.sqlite_path must be set for the sqlite backend".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<F, T, P>(lookup: &F, key: &'static str, parse: P) -> ConfigResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    lookup(key)
        .map(|value| {
            parse(&value).map_err(|reason| ConfigError::InvalidValue { key, value, reason })
        })
        .transpose()
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port bound on all interfaces.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// `SQLite` database path (sqlite backend only).
    pub sqlite_path: PathBuf,
    /// Deadline for a single storage operation, in milliseconds.
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: PathBuf::from("conversations.sqlite"),
            operation_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    /// Use the `SQLite` backend at `path`.
    #[must_use]
    pub fn with_sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend = StorageBackend::Sqlite;
        self.sqlite_path = path.into();
        self
    }

    /// Set the per-operation deadline.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Per-operation deadline.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.operation_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            (PORT_ENV, "8080"),
            (BACKEND_ENV, "SQLite"),
            (SQLITE_PATH_ENV, "/tmp/convs.db"),
            (OPERATION_TIMEOUT_ENV, "250"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("/tmp/convs.db"));
        assert_eq!(config.storage.operation_timeout_ms, 250);
    }

    #[test]
    fn test_malformed_env_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[(PORT_ENV, "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: PORT_ENV, .. }));

        let err =
            ServiceConfig::from_lookup(lookup_from(&[(BACKEND_ENV, "postgres")])).unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ServiceConfig::default();
        config.storage = config.storage.with_operation_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        config.storage = StorageConfig::default().with_sqlite("");
        assert!(config.validate().is_err());
    }
}
