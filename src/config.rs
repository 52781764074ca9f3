use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{LogFormat, LoggingConfig};
use crate::store::ServerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "taskboard.toml";

/// `[client]` settings used by the board commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API root, including the `/api` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout; 0 disables it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// The complete taskboard.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskboardToml {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TaskboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskboard.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize taskboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// File, then `TASKBOARD_*` environment overrides, then validation.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        self.server.session_ttl().context("Invalid [server] configuration")?;
        Ok(())
    }

    /// Overlay environment values. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TASKBOARD_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("TASKBOARD_PORT") {
            self.server.port = parse_env("TASKBOARD_PORT", &v)?;
        }
        if let Some(v) = lookup("TASKBOARD_DB_PATH") {
            self.server.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TASKBOARD_SESSION_TTL_HOURS") {
            self.server.session_ttl_hours = parse_env("TASKBOARD_SESSION_TTL_HOURS", &v)?;
        }
        if let Some(v) = lookup("TASKBOARD_BASE_URL") {
            self.client.base_url = v;
        }
        if let Some(v) = lookup("TASKBOARD_REQUEST_TIMEOUT_SECS") {
            self.client.request_timeout_secs = parse_env("TASKBOARD_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TASKBOARD_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("TASKBOARD_LOG_FORMAT") {
            self.logging.format = LogFormat::from_str(&v).context("Invalid TASKBOARD_LOG_FORMAT")?;
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, value))
}
