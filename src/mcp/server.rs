//! MCP Server - exposes the codex tools to MCP clients
//!
//! Runs as a stdio-based MCP server. Requests are handled concurrently, each
//! on its own task, so a long codex run never holds up `ping` or calls for
//! other sessions.

use super::transport::{McpMessage, NullTransport, StdioTransport, Transport};
use super::types::*;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Async tool handler. Errors become `isError` tool results.
pub type McpToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<CallToolResult>> + Send + Sync>;

struct RegisteredTool {
    metadata: ToolMetadata,
    handler: McpToolHandler,
}

/// MCP Server implementation
pub struct McpServer {
    transport: Arc<dyn Transport>,
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    initialized: RwLock<bool>,
    server_info: ServerInfo,
    instructions: Option<String>,
}

impl McpServer {
    /// Create a new MCP server over stdio
    pub fn new_stdio() -> Self {
        let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new());
        Self::new(transport)
    }

    /// Create a server for in-process use.
    ///
    /// Does not read stdin or write stdout. Intended for CLI flows and tests
    /// that list or invoke tools directly.
    pub fn new_local() -> Self {
        let transport: Arc<dyn Transport> = Arc::new(NullTransport::new());
        Self::new(transport)
    }

    /// Create a new MCP server with custom transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            tools: RwLock::new(BTreeMap::new()),
            initialized: RwLock::new(false),
            server_info: ServerInfo {
                name: "codex-persistent-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        }
    }

    /// Text returned to clients in the `initialize` result
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool
    pub async fn register_tool(
        &self,
        name: &str,
        description: &str,
        input_schema: Value,
        output_schema: Option<Value>,
        handler: McpToolHandler,
    ) {
        let metadata = ToolMetadata::new(
            name.to_string(),
            Some(description.to_string()),
            input_schema,
            output_schema,
        );

        let mut tools = self.tools.write().await;
        tools.insert(name.to_string(), RegisteredTool { metadata, handler });

        debug!("Registered MCP tool: {}", name);
    }

    /// Get tool metadata by name
    pub async fn get_tool_metadata(&self, name: &str) -> Option<ToolMetadata> {
        let tools = self.tools.read().await;
        tools.get(name).map(|t| t.metadata.clone())
    }

    /// All tool metadata, sorted by name
    pub async fn get_all_tool_metadata(&self) -> Vec<ToolMetadata> {
        let tools = self.tools.read().await;
        tools.values().map(|t| t.metadata.clone()).collect()
    }

    /// Call a tool directly without going through the transport
    pub async fn call_tool_direct(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let handler = self
            .handler(name)
            .await
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", name))?;
        handler(arguments).await
    }

    async fn handler(&self, name: &str) -> Option<McpToolHandler> {
        let tools = self.tools.read().await;
        tools.get(name).map(|t| Arc::clone(&t.handler))
    }

    /// Run the MCP server until the transport closes
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            tools = self.tools.read().await.len(),
            "Starting MCP server"
        );

        loop {
            match self.transport.receive().await? {
                Some(McpMessage::Request(request)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        let response = server.handle_request(request).await;
                        if let Err(e) = server.transport.send_response(response).await {
                            warn!(error = %e, "Failed to send MCP response");
                        }
                    });
                }
                Some(McpMessage::Notification(notification)) => {
                    self.handle_notification(notification).await;
                }
                Some(McpMessage::Response(response)) => {
                    warn!("Unexpected response received: {:?}", response.id);
                }
                Some(McpMessage::Malformed(reason)) => {
                    warn!(%reason, "Discarding malformed MCP message");
                    let response =
                        JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error(reason));
                    self.transport.send_response(response).await?;
                }
                None => {
                    info!("Transport closed, shutting down MCP server");
                    break;
                }
            }
        }

        self.transport.close().await
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling request: {} (id: {:?})", request.method, request.id);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        debug!("Handling notification: {}", notification.method);

        match notification.method.as_str() {
            "notifications/initialized" => {
                *self.initialized.write().await = true;
                info!("MCP client initialized");
            }
            "notifications/cancelled" => {
                debug!("Cancellation is not supported; the call runs to completion or timeout");
            }
            _ => {
                debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?
            }
            None => return Err(JsonRpcError::invalid_params("Missing params")),
        };
        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol = %params.protocol_version,
            "MCP initialize"
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self.tools.read().await;
        let result = ListToolsResult {
            tools: tools.values().map(|t| McpTool::from(&t.metadata)).collect(),
            next_cursor: None,
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?
            }
            None => return Err(JsonRpcError::invalid_params("Missing params")),
        };

        let handler = self
            .handler(&params.name)
            .await
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let result = match handler(params.arguments).await {
            Ok(result) => result,
            Err(e) => CallToolResult::error(e.to_string()),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }
}
