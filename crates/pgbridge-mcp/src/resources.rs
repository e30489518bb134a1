//! MCP resources.
//!
//! Read-only views over the schema discovery and `select` tools:
//! `postgres://tables`, `postgres://schema/{table}` and
//! `postgres://data/{table}`. Reads go through the Dispatch Core like any
//! other call.

use crate::protocol::{ResourceInfo, ResourceTemplate};
use serde_json::{Value, json};

pub const SCHEME: &str = "postgres://";
pub const TABLES_URI: &str = "postgres://tables";
const MIME_JSON: &str = "application/json";

/// Concrete resources.
pub fn list() -> Vec<ResourceInfo> {
    vec![ResourceInfo {
        uri: TABLES_URI.to_string(),
        name: "tables".to_string(),
        description: "Tables and views in the public schema".to_string(),
        mime_type: MIME_JSON.to_string(),
    }]
}

/// Parameterised resources.
pub fn templates() -> Vec<ResourceTemplate> {
    vec![
        ResourceTemplate {
            uri_template: "postgres://schema/{table}".to_string(),
            name: "table schema".to_string(),
            description: "Columns of a table in ordinal order".to_string(),
            mime_type: MIME_JSON.to_string(),
        },
        ResourceTemplate {
            uri_template: "postgres://data/{table}".to_string(),
            name: "table data".to_string(),
            description: "The first rows of a table, up to the default row limit".to_string(),
            mime_type: MIME_JSON.to_string(),
        },
    ]
}

pub fn mime_type() -> &'static str {
    MIME_JSON
}

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoute {
    Tables,
    Schema { table: String },
    Data { table: String },
}

impl ResourceRoute {
    /// Parse a URI; `None` for anything not served here. Table names are
    /// validated later by the binder like any tool argument.
    pub fn parse(uri: &str) -> Option<Self> {
        let path = uri.strip_prefix(SCHEME)?;
        match path.split_once('/') {
            None if path == "tables" => Some(ResourceRoute::Tables),
            Some(("schema", table)) if !table.is_empty() => Some(ResourceRoute::Schema {
                table: table.to_string(),
            }),
            Some(("data", table)) if !table.is_empty() => Some(ResourceRoute::Data {
                table: table.to_string(),
            }),
            _ => None,
        }
    }

    /// The tool call that serves this resource.
    pub fn tool_call(&self) -> (&'static str, Value) {
        match self {
            ResourceRoute::Tables => ("list_tables", json!({})),
            ResourceRoute::Schema { table } => ("describe_table", json!({"table": table})),
            ResourceRoute::Data { table } => ("select", json!({"table": table})),
        }
    }
}
