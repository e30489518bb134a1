//! Upstream Postgres connection settings.
//!
//! A connection is described either by a URL (`database_url_env` first, then
//! `database_url`) or by the individual fields. The password may likewise come
//! from an environment variable named by `password_env`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Name of an environment variable holding a full connection URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password. Wins over
    /// `password`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    pub ssl_mode: SslMode,
    pub pool: ConnectionPoolConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            database_url_env: None,
            database_url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: None,
            password_env: None,
            ssl_mode: SslMode::Prefer,
            pool: ConnectionPoolConfig::default(),
        }
    }
}

impl UpstreamConfig {
    /// The configured connection URL, if any. `None` means the individual
    /// fields apply.
    pub fn resolved_url(&self) -> Option<String> {
        self.database_url_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .or_else(|| self.database_url.clone())
    }

    pub fn get_password(&self) -> Option<String> {
        self.password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .or_else(|| self.password.clone())
    }

    /// Where we connect, without credentials. Safe to log.
    pub fn redacted(&self) -> String {
        if self.resolved_url().is_some() {
            return "<database url>".to_string();
        }
        format!(
            "postgresql://{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

/// libpq `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.to_ascii_lowercase().as_str() {
            "disable" => SslMode::Disable,
            "allow" => SslMode::Allow,
            "prefer" => SslMode::Prefer,
            "require" => SslMode::Require,
            "verify-ca" => SslMode::VerifyCa,
            "verify-full" => SslMode::VerifyFull,
            other => return Err(format!("unknown ssl mode '{}'", other)),
        };
        Ok(mode)
    }
}

/// Bounds of the connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    /// Opened by `warm_up` before the server accepts calls.
    pub min_connections: u32,
    pub max_connections: u32,
    /// Longest a call waits for a free connection.
    pub acquire_timeout_seconds: u64,
    /// Idle connections older than this are pinged before reuse.
    pub validation_interval_seconds: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_seconds: 30,
            validation_interval_seconds: 60,
        }
    }
}
