//! Demo ticket server
//!
//! A mock Jira backend served over MCP stdio, handy for trying the chat loop
//! without a real tracker:
//!
//! ```toml
//! [mcp_servers.jira]
//! command = "veil"
//! args = ["serve-demo"]
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use veil_mcp::{McpHandler, McpTool};

const FALLBACK_EMAIL: &str = "satish.k@test.com";

/// Mock ticket tracker and user directory
pub struct DemoJira;

impl DemoJira {
    fn tickets_assigned_to(user_email: &str) -> Value {
        json!([
            {
                "ticket_id": "PROJ-2024-001",
                "summary": "Fix authentication vulnerability in user login system",
                "description": "Critical security issue affecting user accounts",
                "assignee": user_email,
                "priority": "HIGH",
                "status": "IN_PROGRESS"
            },
            {
                "ticket_id": "PROJ-2024-002",
                "summary": "Update customer database schema for GDPR compliance",
                "description": "Database contains PII that needs protection",
                "assignee": user_email,
                "priority": "MEDIUM",
                "status": "OPEN"
            }
        ])
    }

    fn email_for(user_id: &str) -> &'static str {
        match user_id {
            "user123" => "user123@test.com",
            "user456" => "user456@test.com",
            _ => FALLBACK_EMAIL,
        }
    }
}

fn string_arg<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required parameter: {}", key))
}

#[async_trait]
impl McpHandler for DemoJira {
    async fn list_tools(&self) -> Vec<McpTool> {
        vec![
            McpTool {
                name: "get_tickets_assigned_to_user".to_string(),
                description: "Get tickets assigned to a user from jira. Returns a JSON list of tickets."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_email": {
                            "type": "string",
                            "description": "Email of the user to get tickets assigned to"
                        }
                    },
                    "required": ["user_email"]
                }),
            },
            McpTool {
                name: "get_email_id_from_user_id".to_string(),
                description: "Get the email id of a user from their user id".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "string",
                            "description": "User ID to get the email for"
                        }
                    },
                    "required": ["user_id"]
                }),
            },
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
        match name {
            "get_tickets_assigned_to_user" => {
                let email = string_arg(&arguments, "user_email")?;
                Ok(Self::tickets_assigned_to(email))
            }
            "get_email_id_from_user_id" => {
                let user_id = string_arg(&arguments, "user_id")?;
                Ok(Value::String(Self::email_for(user_id).to_string()))
            }
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}
