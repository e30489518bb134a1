//! Errors raised while setting up or running the server.
//!
//! A failed tool call is never one of these: it is reported to the caller as
//! a [`CallResult`](pgbridge_core::CallResult) error envelope.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    /// The HTTP listener could not bind.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A tool with the same name is already registered.
    #[error("tool already registered: {name}")]
    DuplicateTool { name: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// Reading stdin failed.
    #[error("stdio error: {0}")]
    Io(#[from] std::io::Error),
}
