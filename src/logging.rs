//! Structured logging via the `tracing` crate.
//!
//! Level and format come from configuration, with the `LINTEL_LOG` environment
//! variable taking precedence so operators can override a running engine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
        }
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. `LINTEL_LOG` environment variable (full filter directives)
/// 2. Configuration file
/// 3. Defaults
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_env("LINTEL_LOG") {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(&config.level),
    };

    let base_subscriber = Registry::default().with(filter);

    match config.format.as_str() {
        "json" => {
            base_subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339()),
                )
                .init();
        }
        "text" => {
            base_subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339()),
                )
                .init();
        }
        other => {
            return Err(ConfigError::InvalidLogFormat(other.to_string()));
        }
    }

    Ok(())
}
