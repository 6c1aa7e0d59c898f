//! MCP Server implementation

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::protocol::{methods, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::{McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// Handler for MCP requests
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// List available tools
    async fn list_tools(&self) -> Vec<McpTool>;

    /// Call a tool. Strings are returned as text, anything else as JSON text.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String>;
}

/// MCP Server
pub struct McpServer<H: McpHandler> {
    handler: Arc<H>,
    capabilities: ServerCapabilities,
    server_name: String,
    server_version: String,
}

impl<H: McpHandler> McpServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            capabilities: ServerCapabilities {
                tools: Some(crate::ToolsCapability { list_changed: false }),
            },
            server_name: "veil-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Handle one raw incoming message.
    ///
    /// Returns `None` for notifications, which get no reply.
    pub async fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        if message.get("id").is_none() {
            debug!(method = ?message.get("method"), "Notification received");
            return None;
        }

        match serde_json::from_value::<JsonRpcRequest>(message) {
            Ok(request) => Some(self.handle_request(request).await),
            Err(e) => {
                warn!(error = %e, "Malformed request");
                Some(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(),
                ))
            }
        }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.id),
            methods::PING => JsonRpcResponse::success(request.id, serde_json::json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(request.id).await,
            methods::TOOLS_CALL => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found()),
        }
    }

    /// Serve newline-delimited JSON-RPC over this process's stdin/stdout
    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let reply = match serde_json::from_str::<Value>(&line) {
                Ok(message) => self.handle_message(message).await,
                Err(_) => Some(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(),
                )),
            };

            if let Some(reply) = reply {
                let json = serde_json::to_string(&reply)?;
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    fn handle_initialize(&self, id: RequestId) -> JsonRpcResponse {
        let result = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version
            }
        });

        JsonRpcResponse::success(id, result)
    }

    async fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let tools = self.handler.list_tools().await;
        JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        let (text, is_error) = match self.handler.call_tool(name, arguments).await {
            Ok(Value::String(s)) => (s, false),
            Ok(other) => (other.to_string(), false),
            Err(e) => (e, true),
        };

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl McpHandler for EchoHandler {
        async fn list_tools(&self) -> Vec<McpTool> {
            vec![McpTool {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: json!({ "type": "object" }),
            }]
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
            match name {
                "echo" => Ok(arguments),
                other => Err(format!("Unknown tool: {}", other)),
            }
        }
    }

    fn server() -> McpServer<EchoHandler> {
        McpServer::new(Arc::new(EchoHandler)).with_name("echo-server")
    }

    #[tokio::test]
    async fn test_initialize_reports_name() {
        let request = JsonRpcRequest::new(RequestId::Number(1), methods::INITIALIZE);
        let response = server().handle_request(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "echo-server");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_tools_call_error_is_flagged() {
        let request = JsonRpcRequest::new(RequestId::Number(2), methods::TOOLS_CALL)
            .with_params(json!({ "name": "missing", "arguments": {} }));
        let response = server().handle_request(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Unknown tool: missing");
    }

    #[tokio::test]
    async fn test_tools_call_without_name_is_invalid() {
        let request = JsonRpcRequest::new(RequestId::Number(3), methods::TOOLS_CALL)
            .with_params(json!({ "arguments": {} }));
        let response = server().handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let reply = server()
            .handle_message(crate::protocol::notification(methods::INITIALIZED))
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let request = JsonRpcRequest::new(RequestId::Number(4), "resources/list");
        let response = server().handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }
}
