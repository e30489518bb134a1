//! MCP server implementation.
//!
//! Routes JSON-RPC methods to the Dispatch Core. The stdio transport reads
//! newline-delimited requests, handles each on its own task and funnels the
//! responses through a single writer task so lines never interleave.

use crate::dispatch::Dispatcher;
use crate::error::McpError;
use crate::http_transport::HttpServer;
use crate::protocol::*;
use crate::resources::{self, ResourceRoute};
use pgbridge_core::{CallResult, ErrorKind, McpConfig, Transport};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

const SERVER_NAME: &str = "pgbridge";

/// The MCP server.
pub struct McpServer {
    config: McpConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: Notify,
}

impl McpServer {
    /// Create a new MCP server with the given configuration.
    pub fn new(config: McpConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            shutdown: Notify::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Resolves once a `shutdown` request has been handled.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await
    }

    /// Start the MCP server on the configured transport.
    pub async fn run(self: Arc<Self>) -> Result<(), McpError> {
        match self.config.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http => {
                HttpServer::new(self.config.bind_address(), self.clone())
                    .run()
                    .await
            }
        }
    }

    /// Run the server with stdio transport.
    async fn run_stdio(self: Arc<Self>) -> Result<(), McpError> {
        info!("Starting MCP server with stdio transport");
        self.serve_lines(tokio::io::stdin(), tokio::io::stdout()).await?;
        info!("stdio transport closed");
        Ok(())
    }

    /// Serve newline-delimited requests from `input` until EOF or shutdown.
    ///
    /// A line that is not valid UTF-8 is answered with a parse error and
    /// reading continues.
    pub async fn serve_lines<R, W>(
        self: Arc<Self>,
        input: R,
        mut output: W,
    ) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(64);
        let writer = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let mut line = match serde_json::to_string(&response) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "failed to serialize response");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = output.write_all(line.as_bytes()).await {
                    error!(error = %e, "output closed");
                    break;
                }
                let _ = output.flush().await;
            }
        });

        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        loop {
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read?,
                _ = self.shutdown.notified() => break,
            };
            if read == 0 {
                break;
            }
            let line = match String::from_utf8(std::mem::take(&mut buf)) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "request line is not valid UTF-8");
                    let response =
                        JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
                    let _ = tx.send(response).await;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_line(&line).await {
                    let _ = tx.send(response).await;
                }
            });
        }

        // in-flight requests hold senders; the writer drains until they finish
        drop(tx);
        writer
            .await
            .map_err(|e| McpError::Transport(format!("writer task failed: {}", e)))?;
        Ok(())
    }

    /// Handle one raw message. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )),
        }
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid request: jsonrpc must be \"2.0\"",
            ));
        }
        if request.method.starts_with("notifications/") {
            debug!(method = %request.method, "notification received");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "resources/list" => JsonRpcResponse::success(id, json!({"resources": resources::list()})),
            "resources/templates/list" => JsonRpcResponse::success(
                id,
                json!({"resourceTemplates": resources::templates()}),
            ),
            "resources/read" => self.handle_read_resource(id, request.params).await,
            "shutdown" => self.handle_shutdown(id),
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };

        if request.id.is_none() {
            return None;
        }
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "subscribe": false,
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ListToolsResponse {
            tools: self.dispatcher.registry().infos(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
            }
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };
        if !matches!(params.arguments, Value::Object(_) | Value::Null) {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                "Invalid params: arguments must be an object",
            );
        }

        let result = self.dispatcher.call(&params.name, params.arguments).await;
        call_tool_response(id, &result)
    }

    async fn handle_read_resource(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params: ReadResourceParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
            }
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };
        let Some(route) = ResourceRoute::parse(&params.uri) else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Unknown resource: {}", params.uri),
            );
        };

        let (tool, arguments) = route.tool_call();
        let result = self.dispatcher.call(tool, arguments).await;
        let envelope = match serde_json::to_value(&result) {
            Ok(envelope) => envelope,
            Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        };

        if let CallResult::Error(err) = &result {
            let code = match err.kind {
                ErrorKind::InvalidArgument | ErrorKind::UnknownTool => INVALID_PARAMS,
                _ => INTERNAL_ERROR,
            };
            return JsonRpcResponse::error(id, code, err.message.clone()).with_data(envelope);
        }

        let contents = ResourceContents {
            uri: params.uri,
            mime_type: resources::mime_type().to_string(),
            text: envelope.to_string(),
        };
        JsonRpcResponse::success(id, json!({ "contents": [contents] }))
    }

    fn handle_shutdown(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("MCP server shutdown requested");
        self.shutdown.notify_one();
        JsonRpcResponse::success(id, json!(null))
    }
}

fn call_tool_response(id: Option<Value>, result: &CallResult) -> JsonRpcResponse {
    let envelope = match serde_json::to_value(result) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "failed to serialize call result");
            return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string());
        }
    };
    let response = CallToolResponse {
        content: vec![ToolContent::Text {
            text: envelope.to_string(),
        }],
        structured_content: envelope,
        is_error: !result.is_ok(),
    };
    match serde_json::to_value(response) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}
