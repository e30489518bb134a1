//! # pgbridge-core
//!
//! Types shared by every pgbridge crate:
//!
//! - [`config`]: the YAML/environment configuration
//! - [`ArgValue`]: caller argument values as a closed sum type
//! - [`BoundStatement`]: SQL text with placeholders and its parameter list
//! - [`CallResult`] and [`ErrorKind`]: the outcome of a tool call

pub mod config;
pub mod result;
pub mod statement;
pub mod value;

pub use config::{
    BridgeConfig, ConfigError, ConnectionPoolConfig, GuardrailsConfig, LogFormat, LoggingConfig,
    McpConfig, SslMode, Transport, UpstreamConfig,
};
pub use result::{CallError, CallResult, DbError, ErrorKind, QueryOutput, RowSet, Scalar};
pub use statement::{BindValue, BoundStatement, StatementKind};
pub use value::{ArgValue, ValueKind};
