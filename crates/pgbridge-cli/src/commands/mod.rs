//! CLI command implementations for pgbridge.

pub mod check;
pub mod serve;
pub mod tools;

use anyhow::{Context, Result};
use pgbridge_core::{BridgeConfig, Transport};
use std::path::Path;

/// Values given on the command line. They win over the environment and the
/// file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
}

impl Overrides {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(transport) = self.transport {
            config.mcp.transport = transport;
        }
        if let Some(host) = &self.host {
            config.mcp.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mcp.port = port;
        }
        if let Some(url) = &self.database_url {
            config.upstream.database_url = Some(url.clone());
            config.upstream.database_url_env = None;
        }
    }
}

/// Load `path` (defaults when it does not exist), then layer the `POSTGRES_*`
/// environment and the CLI overrides, then validate.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<BridgeConfig> {
    let mut config = if path.exists() {
        BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
    } else {
        BridgeConfig::default()
    };
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid POSTGRES_* environment")?;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
