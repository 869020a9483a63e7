//! Runtime configuration.
//!
//! Layered load: an optional TOML file first, then `LINTEL_*` environment
//! variable overrides (e.g. `LINTEL_REWIND__ATTEMPT_LIMIT=3`).

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintelConfig {
    /// Rewind policy settings
    #[serde(default)]
    pub rewind: RewindConfig,

    /// Top-level output materialization settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rewind policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewindConfig {
    /// Per-request bound on rewind attempts before failing permanently
    #[serde(default = "default_attempt_limit")]
    pub attempt_limit: u32,
}

fn default_attempt_limit() -> u32 {
    5
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            attempt_limit: default_attempt_limit(),
        }
    }
}

/// Top-level output materialization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Whether output materialization is deferred to completion time.
    /// Off when every action already localizes its outputs.
    #[serde(default)]
    pub deferred: bool,

    /// Upper bound on the final materialization wait, in seconds
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

fn default_wait_secs() -> u64 {
    300
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            deferred: false,
            wait_secs: default_wait_secs(),
        }
    }
}

impl DownloadConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

impl LintelConfig {
    /// Load configuration from an optional file plus `LINTEL_*` overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("LINTEL").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
