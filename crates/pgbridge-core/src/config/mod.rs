//! Configuration types for pgbridge.
//!
//! Configuration is loaded from a YAML file (`pgbridge.yaml`), then the
//! `POSTGRES_*` environment variables are layered on top, and finally the CLI
//! may override individual fields.
//!
//! # Configuration File
//!
//! ```yaml
//! upstream:
//!   host: localhost
//!   port: 5432
//!   database: app
//!   username: agent
//!   password_env: APP_DB_PASSWORD
//!   ssl_mode: prefer
//!   pool:
//!     min_connections: 1
//!     max_connections: 10
//! mcp:
//!   transport: stdio
//! guardrails:
//!   default_row_limit: 100
//! logging:
//!   level: info
//!   format: text
//! ```

pub mod mcp;
pub mod upstream;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use mcp::{McpConfig, Transport};
pub use upstream::{ConnectionPoolConfig, SslMode, UpstreamConfig};

/// Complete pgbridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Upstream Postgres connection.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// MCP server settings.
    #[serde(default)]
    pub mcp: McpConfig,

    /// Limits applied to every tool call.
    #[serde(default)]
    pub guardrails: GuardrailsConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Global guardrails configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Row limit used by `select` when the caller does not pass one.
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u64,

    /// Maximum rows that can be returned in any query.
    #[serde(default = "default_max_rows")]
    pub max_rows_per_query: u64,

    /// Maximum rows that can be affected by INSERT/UPDATE/DELETE.
    #[serde(default = "default_max_affected")]
    pub max_affected_rows: u64,

    /// Deadline for a whole tool call (acquire + execute).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Server-side `statement_timeout` set on every connection.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_seconds: u64,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            default_row_limit: default_row_limit(),
            max_rows_per_query: default_max_rows(),
            max_affected_rows: default_max_affected(),
            call_timeout_seconds: default_call_timeout(),
            statement_timeout_seconds: default_statement_timeout(),
        }
    }
}

impl GuardrailsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_seconds)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_row_limit() -> u64 {
    100
}

fn default_max_rows() -> u64 {
    1000
}

fn default_max_affected() -> u64 {
    1000
}

fn default_call_timeout() -> u64 {
    30
}

fn default_statement_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load the file if it exists (defaults otherwise), apply the process
    /// environment and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the `POSTGRES_*` variables over the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("POSTGRES_HOST") {
            self.upstream.host = host;
        }
        if let Some(port) = lookup("POSTGRES_PORT") {
            self.upstream.port = port
                .parse()
                .map_err(|_| ConfigError::Config(format!("invalid POSTGRES_PORT '{}'", port)))?;
        }
        if let Some(database) = lookup("POSTGRES_DB") {
            self.upstream.database = database;
        }
        if let Some(user) = lookup("POSTGRES_USER") {
            self.upstream.username = user;
        }
        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            self.upstream.password = Some(password);
        }
        if let Some(mode) = lookup("POSTGRES_SSLMODE") {
            self.upstream.ssl_mode = mode.parse().map_err(ConfigError::Config)?;
        }
        Ok(())
    }

    /// Reject settings the pool and dispatcher cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.upstream.pool;
        if pool.max_connections == 0 {
            return Err(ConfigError::Config(
                "upstream.pool.max_connections must be at least 1".to_string(),
            ));
        }
        if pool.min_connections > pool.max_connections {
            return Err(ConfigError::Config(format!(
                "upstream.pool.min_connections ({}) exceeds max_connections ({})",
                pool.min_connections, pool.max_connections
            )));
        }
        if pool.acquire_timeout_seconds == 0 {
            return Err(ConfigError::Config(
                "upstream.pool.acquire_timeout_seconds must be positive".to_string(),
            ));
        }
        let guardrails = &self.guardrails;
        if guardrails.call_timeout_seconds == 0 {
            return Err(ConfigError::Config(
                "guardrails.call_timeout_seconds must be positive".to_string(),
            ));
        }
        if guardrails.default_row_limit == 0
            || guardrails.default_row_limit > guardrails.max_rows_per_query
        {
            return Err(ConfigError::Config(format!(
                "guardrails.default_row_limit ({}) must be between 1 and max_rows_per_query ({})",
                guardrails.default_row_limit, guardrails.max_rows_per_query
            )));
        }
        Ok(())
    }
}
