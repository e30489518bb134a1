//! # pgbridge-mcp
//!
//! MCP (Model Context Protocol) server that exposes a fixed catalog of
//! PostgreSQL operations as tools for AI agents.
//!
//! ## Architecture
//!
//! ```text
//! AI Agent
//!       │
//!       │ MCP protocol (tools/list, tools/call, resources/read)
//!       ▼
//! ┌──────────────────────┐
//! │  pgbridge MCP server │
//! │  1. Resolve tool     │  ← ToolRegistry
//! │  2. Bind arguments   │  ← binder (identifiers quoted, values as $n)
//! │  3. Lease connection │  ← pgbridge-runtime ConnectionPool
//! │  4. Execute          │  ← transaction for mutating tools
//! │  5. Normalize        │  ← CallResult envelope
//! └──────────┬───────────┘
//!            │
//!            ▼
//!      Upstream Postgres
//! ```
//!
//! ## Tools
//!
//! | Tool | Mutating |
//! |------|----------|
//! | `list_tables`, `describe_table`, `select` | no |
//! | `insert`, `update`, `delete` | yes (row guardrail) |
//! | `create_table`, `drop_table` | yes |
//!
//! ## Example Usage
//!
//! ```ignore
//! use pgbridge_mcp::{Dispatcher, McpServer, ToolRegistry};
//! use pgbridge_runtime::ConnectionPool;
//!
//! let registry = Arc::new(ToolRegistry::with_builtins()?);
//! let pool = ConnectionPool::new(connector, &config.upstream.pool);
//! pool.warm_up().await?;
//!
//! let dispatcher = Arc::new(Dispatcher::new(registry, pool, &config.guardrails));
//! Arc::new(McpServer::new(config.mcp.clone(), dispatcher)).run().await?;
//! ```

pub mod binder;
pub mod builtin;
pub mod dispatch;
pub mod error;
pub mod http_transport;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;

// Re-export main types
pub use binder::{BindError, BindLimits, BoundArgs};
pub use dispatch::{CallStage, Dispatcher};
pub use error::McpError;
pub use protocol::{
    CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse, ToolAnnotations,
    ToolContent, ToolInfo,
};
pub use server::McpServer;
pub use tools::{Effect, ParamKind, ParamSpec, ToolDefinition, ToolRegistry};
