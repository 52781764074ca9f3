//! Subscriber setup for the `taskboard` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary, once, before any other work.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error, PartialEq)]
pub enum LogError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    #[error("invalid log format: {0} (expected text|json)")]
    InvalidFormat(String),
    #[error("logger already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// `[logging]` in taskboard.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub with_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            with_targets: false,
        }
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `cfg.level`.
pub fn init(cfg: &LoggingConfig) -> Result<(), LogError> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => mk_filter(&directives)?,
        _ => mk_filter(&cfg.level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match cfg.format {
        LogFormat::Text => registry
            .with(
                tfmt::layer()
                    .with_target(cfg.with_targets)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tfmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(cfg.with_targets)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}

fn mk_filter(level: &str) -> Result<EnvFilter, LogError> {
    EnvFilter::try_new(level).map_err(|_| LogError::InvalidLevel(level.to_string()))
}
