//! MCP-backed tool invoker
//!
//! Exposes the tools of one MCP server through `ToolInvoker`. Results keep
//! the server's content items as-is (annotations and `_meta` included) so
//! redaction can rewrite their text without losing anything.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use veil_mcp::{ClientInfo, HttpTransport, McpClient, StdioTransport, Transport};

use super::{ToolInvoker, ToolResult, ToolRouter};
use crate::catalog::ToolDescriptor;
use crate::config::{Config, McpServerConfig, McpTransportKind};
use crate::content::Content;
use crate::error::{Error, Result};

/// Tools of a single MCP server
pub struct McpToolInvoker<T: Transport> {
    server: String,
    client: McpClient<T>,
}

impl<T: Transport> McpToolInvoker<T> {
    /// Run the MCP handshake over `transport`
    pub async fn connect(server: impl Into<String>, transport: T) -> Result<Self> {
        let server = server.into();
        let mut client = McpClient::new(transport);
        let info = client
            .initialize(ClientInfo::default())
            .await
            .map_err(|e| Error::Config(format!("MCP server '{}' failed to initialize: {}", server, e)))?;

        info!(server = %server, remote = %info.name, version = %info.version, "Connected to MCP server");
        Ok(Self { server, client })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub async fn close(&self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
    }
}

#[async_trait]
impl<T: Transport + 'static> ToolInvoker for McpToolInvoker<T> {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self
            .client
            .list_tools()
            .await
            .map_err(|e| Error::Config(format!("MCP server '{}' tools/list failed: {}", self.server, e)))?;

        debug!(server = %self.server, count = tools.len(), "Discovered MCP tools");
        Ok(tools
            .into_iter()
            .map(|tool| ToolDescriptor::new(tool.name, tool.description, tool.input_schema))
            .collect())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        match self.client.call_tool(name, arguments).await {
            Ok(result) => {
                let items: Vec<Content> = result
                    .content
                    .into_iter()
                    .map(|item| serde_json::to_value(item).map(Content::from_tool_content))
                    .collect::<std::result::Result<_, _>>()
                    .unwrap_or_else(|e| vec![Content::text(format!("Unreadable tool content: {}", e))]);

                ToolResult {
                    content: Content::Sequence(items),
                    is_error: result.is_error,
                }
            }
            Err(e) => ToolResult::failed(format!(
                "MCP tool '{}' on server '{}' failed: {}",
                name, self.server, e
            )),
        }
    }
}

/// Connect to a configured MCP server over its transport
pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Arc<dyn ToolInvoker>> {
    let kind = config
        .transport()
        .map_err(|e| Error::Config(format!("mcp_servers.{}: {}", name, e)))?;

    match (kind, &config.command, &config.url) {
        (McpTransportKind::Stdio, Some(command), _) => {
            let transport = StdioTransport::spawn(command, &config.args, &config.env).await?;
            Ok(Arc::new(McpToolInvoker::connect(name, transport).await?))
        }
        (McpTransportKind::Http, _, Some(url)) => {
            let mut transport = HttpTransport::new(url.clone());
            for (header, value) in &config.headers {
                transport = transport.with_header(header.clone(), value.clone());
            }
            if let Some(token) = config.bearer_token() {
                transport = transport.with_bearer_token(token);
            }
            Ok(Arc::new(McpToolInvoker::connect(name, transport).await?))
        }
        _ => Err(Error::Config(format!("mcp_servers.{}: incomplete transport", name))),
    }
}

/// Connect to every enabled MCP server in `config`.
///
/// Servers that fail to start or initialize are logged and skipped.
pub async fn connect_all(config: &Config) -> ToolRouter {
    let mut router = ToolRouter::new();
    for (name, server) in config.enabled_mcp_servers() {
        match connect(name, server).await {
            Ok(invoker) => router.add(name.clone(), invoker),
            Err(e) => warn!(server = %name, error = %e, "Skipping MCP server"),
        }
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io;
    use veil_mcp::{McpHandler, McpServer, McpTool};

    struct Directory;

    #[async_trait]
    impl McpHandler for Directory {
        async fn list_tools(&self) -> Vec<McpTool> {
            vec![McpTool {
                name: "get_email_id_from_user_id".to_string(),
                description: "Get email id from user id".to_string(),
                input_schema: json!({ "type": "object" }),
            }]
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> std::result::Result<Value, String> {
            match (name, arguments["user_id"].as_str()) {
                ("get_email_id_from_user_id", Some("alice")) => Ok(json!("alice@example.com")),
                ("get_email_id_from_user_id", _) => Err("user not found".to_string()),
                (other, _) => Err(format!("Unknown tool: {}", other)),
            }
        }
    }

    struct Loopback {
        server: McpServer<Directory>,
        inbox: VecDeque<Value>,
    }

    #[async_trait]
    impl Transport for Loopback {
        async fn send(&mut self, message: Value) -> io::Result<()> {
            if let Some(reply) = self.server.handle_message(message).await {
                self.inbox.push_back(serde_json::to_value(reply)?);
            }
            Ok(())
        }

        async fn receive(&mut self) -> io::Result<Option<Value>> {
            Ok(self.inbox.pop_front())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn invoker() -> McpToolInvoker<Loopback> {
        let transport = Loopback {
            server: McpServer::new(Arc::new(Directory)),
            inbox: VecDeque::new(),
        };
        McpToolInvoker::connect("directory", transport).await.unwrap()
    }

    #[tokio::test]
    async fn test_list_and_invoke() {
        let invoker = invoker().await;
        let tools = invoker.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "get_email_id_from_user_id");

        let result = invoker
            .invoke("get_email_id_from_user_id", json!({ "user_id": "alice" }))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content.to_model_text(), "alice@example.com");
        assert_eq!(
            Value::from(result.content),
            json!([{ "type": "text", "text": "alice@example.com" }])
        );
    }

    #[tokio::test]
    async fn test_server_error_flag_is_kept() {
        let invoker = invoker().await;
        let result = invoker
            .invoke("get_email_id_from_user_id", json!({ "user_id": "zed" }))
            .await;
        assert!(result.is_error);
        assert_eq!(result.content.to_model_text(), "user not found");
    }

    #[tokio::test]
    async fn test_connect_rejects_incomplete_config() {
        let config = McpServerConfig {
            url: None,
            ..McpServerConfig::http("unused")
        };
        let err = connect("broken", &config).await.err().unwrap();
        assert!(err.to_string().contains("mcp_servers.broken"));
    }
}
