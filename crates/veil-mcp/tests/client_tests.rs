//! Client/server integration tests
//!
//! Drives `McpClient` against an in-process `McpServer` through a loopback
//! transport, so the full JSON-RPC path is exercised without a subprocess.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use veil_mcp::protocol::{methods, notification};
use veil_mcp::{ClientInfo, McpClient, McpHandler, McpServer, McpTool, Transport};

struct TicketHandler;

#[async_trait]
impl McpHandler for TicketHandler {
    async fn list_tools(&self) -> Vec<McpTool> {
        vec![McpTool {
            name: "get_tickets_assigned_to_user".to_string(),
            description: "Get tickets assigned to a user from jira.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "user_email": { "type": "string" } },
                "required": ["user_email"]
            }),
        }]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
        match name {
            "get_tickets_assigned_to_user" => {
                let email = arguments["user_email"].as_str().unwrap_or_default();
                Ok(json!([{ "ticket_id": "PROJ-2024-001", "assignee": email }]))
            }
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

/// Transport that hands each message straight to a server
struct LoopbackTransport<H: McpHandler> {
    server: Arc<McpServer<H>>,
    inbox: VecDeque<Value>,
    sent: Vec<Value>,
}

impl<H: McpHandler> LoopbackTransport<H> {
    fn new(server: McpServer<H>) -> Self {
        Self {
            server: Arc::new(server),
            inbox: VecDeque::new(),
            sent: Vec::new(),
        }
    }
}

#[async_trait]
impl<H: McpHandler + 'static> Transport for LoopbackTransport<H> {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        self.sent.push(message.clone());
        if let Some(reply) = self.server.handle_message(message).await {
            // Interleave a server notification to check the client skips it
            self.inbox.push_back(notification("notifications/message"));
            self.inbox.push_back(serde_json::to_value(reply)?);
        }
        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        Ok(self.inbox.pop_front())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inbox.clear();
        Ok(())
    }
}

fn client() -> McpClient<LoopbackTransport<TicketHandler>> {
    let server = McpServer::new(Arc::new(TicketHandler)).with_name("jira MCP Server");
    McpClient::new(LoopbackTransport::new(server))
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let mut client = client();
    let info = client.initialize(ClientInfo::default()).await.unwrap();
    assert_eq!(info.name, "jira MCP Server");
    assert!(client.server_capabilities().unwrap().tools.is_some());

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "get_tickets_assigned_to_user");
}

#[tokio::test]
async fn test_call_tool_returns_text_content() {
    let client = client();
    let result = client
        .call_tool(
            "get_tickets_assigned_to_user",
            json!({ "user_email": "alice@example.com" }),
        )
        .await
        .unwrap();

    assert!(!result.is_error);
    assert_eq!(result.content.len(), 1);
    assert_eq!(result.content[0].content_type, "text");
    let text = result.content[0].text.as_deref().unwrap();
    assert!(text.contains("alice@example.com"));
    assert!(text.contains("PROJ-2024-001"));
}

#[tokio::test]
async fn test_call_unknown_tool_sets_error_flag() {
    let client = client();
    let result = client.call_tool("nope", json!({})).await.unwrap();
    assert!(result.is_error);
    assert_eq!(result.content[0].text.as_deref(), Some("Unknown tool: nope"));
}

#[tokio::test]
async fn test_closed_transport_is_reported() {
    let client = client();
    client.close().await.unwrap();

    struct Silent;

    #[async_trait]
    impl Transport for Silent {
        async fn send(&mut self, _message: Value) -> io::Result<()> {
            Ok(())
        }
        async fn receive(&mut self) -> io::Result<Option<Value>> {
            Ok(None)
        }
        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let silent = McpClient::new(Silent);
    let err = silent.list_tools().await.unwrap_err();
    assert!(err.to_string().contains("Connection closed"));
}

#[test]
fn test_initialized_notification_shape() {
    let value = notification(methods::INITIALIZED);
    assert_eq!(value["method"], "notifications/initialized");
    assert!(value.get("id").is_none());
}
