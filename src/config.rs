//! Configuration loading.
//!
//! # Data Flow
//! ```text
//! TOML file (optional, every field defaulted)
//!     → serde deserialization
//!     → environment overrides (PORT, LOG_LEVEL, SITE_ENV)
//!     → validation (log level must parse)
//!     → AppConfig, immutable for the life of the process
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{LoggerOptions, Severity};

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// `production` (default) or `development`. Development mode exposes
    /// raw error messages and stacks in HTML responses.
    pub env: String,

    /// Listener and request-handling settings.
    pub server: ServerConfig,

    /// Logging sink settings.
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "production".to_string(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Listener and request-handling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Per-request deadline; elapsed requests render as Timeout errors.
    pub request_timeout_secs: u64,

    /// Maximum buffered request body size.
    pub body_limit_bytes: usize,

    /// Optional directory served for paths no route matches.
    pub assets_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
            body_limit_bytes: 50 * 1024 * 1024,
            assets_dir: None,
        }
    }
}

/// Logging sink settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Title printed in every log line.
    pub title: String,

    /// Minimum severity name; accepts the documented aliases.
    pub level: String,

    /// Facility keyword for the external sink. Unknown keywords fall back
    /// to the sink's documented default.
    pub facility: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            title: env!("CARGO_PKG_NAME").to_string(),
            level: "info".to_string(),
            facility: "local4".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file, apply environment overrides, and
    /// validate. No file means pure defaults.
    pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => AppConfig::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Raw error messages and stacks are shown only outside production.
    pub fn show_raw_errors(&self) -> bool {
        self.env == "development"
    }

    /// Replace the port of the bind address, keeping the host.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .server
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("0.0.0.0")
            .to_string();
        self.server.bind_address = format!("{host}:{port}");
    }

    /// Logger options derived from the `[logging]` section; the level is
    /// known to parse once `validate` has run.
    pub fn logger_options(&self) -> LoggerOptions {
        LoggerOptions {
            title: Some(self.logging.title.clone()),
            level: Severity::parse(&self.logging.level),
            facility: Some(self.logging.facility.clone()),
        }
    }

    fn apply_env_overrides(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = get("PORT") {
            let port: u16 = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("PORT must be a port number, got {port:?}"))
            })?;
            self.set_port(port);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(env) = get("SITE_ENV") {
            self.env = env;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if Severity::parse(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}",
                self.logging.level
            )));
        }
        Ok(())
    }
}
