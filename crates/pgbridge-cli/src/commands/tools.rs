//! Tools introspection commands.
//!
//! `pgbridge tools list` - List the tool catalog.
//! `pgbridge tools describe` - Show the input schema of one tool.
//!
//! Both read the same registry the server builds, without touching the
//! database.

use anyhow::{Context, Result};
use pgbridge_mcp::{ToolDefinition, ToolRegistry};

fn registry() -> Result<ToolRegistry> {
    ToolRegistry::with_builtins().context("Failed to register tools")
}

fn badges(tool: &ToolDefinition) -> String {
    let mut badges = vec![if tool.is_mutating() { "write" } else { "read" }];
    if tool.destructive {
        badges.push("destructive");
    }
    badges.join(", ")
}

/// List the registered tools.
pub fn list(verbose: bool, json: bool) -> Result<()> {
    let registry = registry()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.infos())?);
        return Ok(());
    }

    println!("\n🔧 Available Tools ({}):", registry.len());
    for tool in registry.list() {
        println!("   • {} ({})", tool.name, badges(tool));
        println!("     {}", tool.description);
        if verbose {
            println!(
                "     Schema: {}",
                serde_json::to_string_pretty(&tool.input_schema())?
            );
        }
    }
    println!();

    Ok(())
}

/// Show detailed schema for a specific tool.
pub fn describe(name: &str) -> Result<()> {
    let registry = registry()?;
    let tool = registry.resolve(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Tool '{}' not found. Available: {}",
            name,
            registry.names().join(", ")
        )
    })?;
    let info = tool.info();

    println!("\nTool: {}", tool.name);
    println!("\nDescription: {}", tool.description);

    println!("\nParameters:");
    for param in &tool.params {
        let mut line = format!(
            "  • {}{}",
            param.name,
            if param.required { "" } else { " (optional)" }
        );
        if let Some(default) = &param.default {
            line.push_str(&format!(" [default: {}]", default));
        }
        println!("{} - {}", line, param.description);
    }

    println!("\nInput Schema:");
    println!("{}", serde_json::to_string_pretty(&info.input_schema)?);

    println!("\nAnnotations:");
    println!("  • readOnlyHint: {}", info.annotations.read_only_hint);
    println!("  • destructiveHint: {}", info.annotations.destructive_hint);
    println!("  • idempotentHint: {}", info.annotations.idempotent_hint);
    println!();

    Ok(())
}
