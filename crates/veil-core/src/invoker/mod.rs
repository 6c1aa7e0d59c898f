//! Tool invocation
//!
//! A `ToolInvoker` discovers tools and runs them by name. Invokers never
//! fail a call outright: unknown tools and tool errors come back as a
//! `ToolResult` with `is_error` set, so the model can react to them.
//!
//! - `ToolRegistry`: in-process tools implementing [`Tool`]
//! - `ToolRouter`: fans out over several invokers (e.g. one per MCP server)
//! - `McpToolInvoker`: tools hosted by an MCP server (feature `mcp`)

#[cfg(feature = "mcp")]
pub mod mcp;
mod registry;
mod router;

pub use registry::{BoxFuture, Tool, ToolRegistry};
pub use router::ToolRouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ToolDescriptor;
use crate::content::Content;
use crate::error::{Result, ToolError};

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Content,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed result carrying an error description for the model
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            content: Content::text_items(message),
            is_error: true,
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(error: ToolError) -> Self {
        ToolResult::failed(error.to_string())
    }
}

/// Discovers and calls tools
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Tools currently available
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Call `name` with `arguments`
    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult;
}
