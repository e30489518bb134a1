//! HTTP transport for MCP server.
//!
//! `POST /mcp` carries one JSON-RPC message per request; `GET /health`
//! reports connection pool statistics. Requests are served concurrently.

use crate::error::McpError;
use crate::server::McpServer;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

/// Create the HTTP router for MCP.
pub fn create_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp_post))
        .route("/health", get(handle_health))
        .with_state(server)
}

/// Handle POST requests to /mcp (JSON-RPC over HTTP).
///
/// The body is taken raw so unparsable input gets a JSON-RPC parse error
/// rather than an HTTP rejection.
async fn handle_mcp_post(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_line(&body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Handle health check requests.
async fn handle_health(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    let pool = server.dispatcher().pool();
    let stats = pool.stats();
    let healthy = !stats.closed && (stats.live > 0 || pool.settings().min_connections == 0);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "service": "pgbridge",
            "version": env!("CARGO_PKG_VERSION"),
            "pool": stats,
        })),
    )
}

/// HTTP server for MCP transport.
pub struct HttpServer {
    bind_address: String,
    server: Arc<McpServer>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(bind_address: impl Into<String>, server: Arc<McpServer>) -> Self {
        Self {
            bind_address: bind_address.into(),
            server,
        }
    }

    /// Run the HTTP server until a `shutdown` request arrives.
    pub async fn run(self) -> Result<(), McpError> {
        let app = create_router(self.server.clone());

        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .map_err(|source| McpError::Bind {
                address: self.bind_address.clone(),
                source,
            })?;

        tracing::info!(address = %self.bind_address, "MCP HTTP server listening");

        let server = self.server;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server.shutdown_requested().await })
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }
}
