//! Configuration module for the syncer.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`syncer.toml` in the working directory)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! The watch root, bucket and region use plain names:
//! - `ROOT_FOLDER` sets `root`
//! - `S3_BUCKET_NAME` sets `bucket`
//! - `AWS_REGION` sets `region`
//!
//! Everything else is prefixed with `SYNCER_` and uses double underscores
//! to separate nested levels:
//! - `SYNCER_WATCH__POLLING_INTERVAL_MS=250` sets `watch.polling_interval_ms`
//! - `SYNCER_STORAGE__BACKEND=local` sets `storage.backend`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "syncer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Watch root is not configured (set ROOT_FOLDER or --root)")]
    MissingRoot,

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Directory tree to watch and mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Destination bucket
    #[serde(default)]
    pub bucket: String,

    /// Storage region, passed through to the backend
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// How often pending changes are dispatched
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Custom S3-compatible endpoint (MinIO, localstack)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Allow plain HTTP to the custom endpoint
    #[serde(default)]
    pub allow_http: bool,

    /// Base directory for the local backend; the bucket is a subdirectory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,

    /// Uploads running at once during a sync
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_polling_interval_ms() -> u64 {
    1000
}
fn default_upload_concurrency() -> usize {
    crate::sync::DEFAULT_UPLOAD_CONCURRENCY
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            endpoint: None,
            allow_http: false,
            local_path: None,
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, reading `syncer.toml` from the
    /// working directory if present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration using a specific file. A missing file is not an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Plain variables for root, bucket and region
            .merge(Env::raw().filter_map(|key| {
                let key = key.as_str();
                if key.eq_ignore_ascii_case("ROOT_FOLDER") {
                    Some("root".into())
                } else if key.eq_ignore_ascii_case("S3_BUCKET_NAME") {
                    Some("bucket".into())
                } else if key.eq_ignore_ascii_case("AWS_REGION") {
                    Some("region".into())
                } else {
                    None
                }
            }))
            // Prefixed variables for everything else
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("SYNCER_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// The configured watch root.
    ///
    /// An absent or empty root is fatal for the engine.
    pub fn root_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.root {
            Some(root) if !root.as_os_str().is_empty() => Ok(root.clone()),
            _ => Err(ConfigError::MissingRoot),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.watch.polling_interval_ms)
    }
}
