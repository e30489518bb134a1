//! `pgbridge serve` - start the MCP server.
//!
//! Opens `min_connections` sessions before accepting any request and refuses
//! to start if that fails. Stops on a `shutdown` request or Ctrl-C, then
//! drains the pool.

use anyhow::{Context, Result};
use pgbridge_adapter_pg::PgConnector;
use pgbridge_core::BridgeConfig;
use pgbridge_mcp::{Dispatcher, McpServer, ToolRegistry};
use pgbridge_runtime::ConnectionPool;
use std::sync::Arc;
use tracing::info;

/// Build the pool for `config` and open its minimum connections.
pub async fn connect(config: &BridgeConfig) -> Result<ConnectionPool> {
    let connector = PgConnector::from_config(&config.upstream, config.guardrails.statement_timeout())
        .context("Invalid upstream configuration")?;
    let pool = ConnectionPool::new(Arc::new(connector), &config.upstream.pool);

    info!(
        upstream = %config.upstream.redacted(),
        min_connections = config.upstream.pool.min_connections,
        max_connections = config.upstream.pool.max_connections,
        "Connecting to upstream"
    );
    if let Err(e) = pool.warm_up().await {
        pool.close().await;
        return Err(e).with_context(|| {
            format!(
                "Could not open {} connection(s) to {}",
                config.upstream.pool.min_connections,
                config.upstream.redacted()
            )
        });
    }
    Ok(pool)
}

pub async fn run(config: BridgeConfig) -> Result<()> {
    let pool = connect(&config).await?;
    let registry = Arc::new(ToolRegistry::with_builtins().context("Failed to register tools")?);
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), pool.clone(), &config.guardrails));
    let server = Arc::new(McpServer::new(config.mcp.clone(), dispatcher));

    info!(
        transport = ?config.mcp.transport,
        address = %config.mcp.bind_address(),
        tools = registry.len(),
        "Starting pgbridge"
    );

    let outcome = tokio::select! {
        result = server.run() => result.context("MCP server failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            Ok(())
        }
    };

    pool.close().await;
    info!(stats = ?pool.stats(), "pgbridge stopped");
    outcome
}
