//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::limits::LimitsConfig;
use super::listen::ListenConfig;
use super::security::{AuthConfig, RateLimitConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and observability.
    pub server: ServerConfig,
    /// WebSocket listener.
    pub listen: ListenConfig,
    /// Persistent store selection.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token verification.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Queue sizes, message caps and timeouts.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Per-connection inbound event rate limits.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, reported in logs and the `ready` frame.
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_metrics_port() -> u16 {
    9090
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Which persistent store backs the core.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite file via sqlx.
    #[default]
    Sqlite,
    /// Process-local maps; nothing survives a restart.
    Memory,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Path to SQLite database file (ignored by the memory backend).
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "parley.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "parley.test"

[listen]
address = "127.0.0.1:8080"
"#,
        )
        .unwrap();

        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.server.log_format, LogFormat::Pretty);
        assert_eq!(config.database.backend, StoreBackend::Sqlite);
        assert_eq!(config.database.path, "parley.db");
        assert!(config.auth.secret.is_empty());
        assert_eq!(config.limits.typing_timeout_secs, 8);
        assert!(config.listen.allow_origins.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "parley.test"
metrics_port = 0
log_format = "json"

[listen]
address = "0.0.0.0:9000"
allow_origins = ["https://app.example"]

[database]
backend = "memory"

[auth]
secret = "hunter2"
max_clock_skew_secs = 5

[limits]
outbound_queue = 16
call_invite_ttl_secs = 30

[rate_limits]
events_per_second = 5
event_burst = 10
"#,
        )
        .unwrap();

        assert_eq!(config.server.metrics_port, 0);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.auth.max_clock_skew_secs, 5);
        assert_eq!(config.limits.outbound_queue, 16);
        assert_eq!(config.limits.call_invite_ttl_secs, 30);
        assert_eq!(config.rate_limits.event_burst, 10);
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str(
            r#"
[server]
name = "x"
[listen]
address = "127.0.0.1:1"
[database]
backend = "postgres"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/parley.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
