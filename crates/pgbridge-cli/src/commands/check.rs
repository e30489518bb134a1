//! `pgbridge check` command implementation.
//!
//! Validates the configuration, opens the minimum pool, and runs
//! `list_tables` through the dispatcher to prove the catalog is readable.
//! Exits non-zero on any failure.

use super::serve;
use anyhow::{Result, bail};
use pgbridge_core::BridgeConfig;
use pgbridge_mcp::{Dispatcher, ToolRegistry};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: &Path, config: BridgeConfig) -> Result<()> {
    println!("\n🔍 Checking pgbridge configuration\n");

    if config_path.exists() {
        println!("   ✓ Configuration: {}", config_path.display());
    } else {
        println!(
            "   ✓ Configuration: defaults ({} not found)",
            config_path.display()
        );
    }
    println!("   ✓ Upstream: {}", config.upstream.redacted());
    println!(
        "   ✓ Pool: {}..{} connections, acquire timeout {}s",
        config.upstream.pool.min_connections,
        config.upstream.pool.max_connections,
        config.upstream.pool.acquire_timeout_seconds
    );

    let pool = serve::connect(&config).await?;
    println!("   ✓ Connected ({} live)", pool.stats().live);

    let registry = Arc::new(ToolRegistry::with_builtins()?);
    println!("   ✓ Tools: {}", registry.names().join(", "));

    let dispatcher = Dispatcher::new(registry, pool.clone(), &config.guardrails);
    let result = dispatcher.call("list_tables", json!({})).await;
    pool.close().await;

    match result.rows() {
        Some(rows) => println!("   ✓ Catalog readable: {} table(s) in public", rows.len()),
        None => bail!(
            "Catalog query failed: {}",
            serde_json::to_string(&result)?
        ),
    }

    println!("\n✅ All checks passed\n");
    Ok(())
}
