//! Configuration loading for lapline-client.
//!
//! Configuration is loaded from a TOML file (default: `lapline.toml`).
//! Every section and key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for lapline-client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote API configuration.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Sync loop configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Local storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote authority, e.g. `https://timing.example.org/api`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Sync loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the background sync loop (default: true).
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
    /// Push interval in milliseconds (default: 5000).
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
    /// Pull interval in milliseconds (default: 5000).
    #[serde(default = "default_pull_interval_ms")]
    pub pull_interval_ms: u64,
}

/// Local storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file. Relative paths resolve against the
    /// data directory.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

// Default value functions
fn default_request_timeout_secs() -> u64 {
    10
}

fn default_sync_enabled() -> bool {
    true
}

fn default_push_interval_ms() -> u64 {
    5_000
}

fn default_pull_interval_ms() -> u64 {
    5_000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("lapline.db")
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            push_interval_ms: default_push_interval_ms(),
            pull_interval_ms: default_pull_interval_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl RemoteConfig {
    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    /// Push interval as a duration. Never zero.
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms.max(1))
    }

    /// Pull interval as a duration. Never zero.
    pub fn pull_interval(&self) -> Duration {
        Duration::from_millis(self.pull_interval_ms.max(1))
    }
}

impl StorageConfig {
    /// Database path resolved against `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.database.is_absolute() {
            self.database.clone()
        } else {
            data_dir.join(&self.database)
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from a TOML file, or defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to encode configuration.
    #[error("failed to encode config: {0}")]
    SerializeError(toml::ser::Error),
    /// Failed to write configuration file.
    #[error("failed to write config file {path}: {source}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
