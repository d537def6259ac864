//! Configuration file handling for qlined.

use std::path::Path;

use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Which payload backend new topics get, and where durable state lives.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// `"memory"` or `"persistent"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory holding one log file per persistent-backed topic.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Where the queue's topic/line state is saved between invocations.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// `"write-always"` (correct, default) or `"read-on-pop-confirm"`
    /// (reproduces the original's flagged locking bug; never use in
    /// production).
    #[serde(default = "default_lock_discipline")]
    pub lock_discipline: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            snapshot_path: default_snapshot_path(),
            lock_discipline: default_lock_discipline(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_data_dir() -> String {
    "/var/lib/qlined".to_string()
}

fn default_snapshot_path() -> String {
    "/var/lib/qlined/qline.snapshot.json".to_string()
}

fn default_lock_discipline() -> String {
    "write-always".to_string()
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
