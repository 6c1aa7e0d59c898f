//! Routing tool calls across several invokers

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ToolInvoker, ToolResult};
use crate::catalog::ToolDescriptor;
use crate::error::{Result, ToolError};

/// Merges the tools of several named invokers.
///
/// Routes are rebuilt on every `list_tools`. When two sources offer the same
/// tool name the first source wins.
#[derive(Default)]
pub struct ToolRouter {
    sources: Vec<(String, Arc<dyn ToolInvoker>)>,
    routes: RwLock<HashMap<String, usize>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, invoker: Arc<dyn ToolInvoker>) {
        self.sources.push((name.into(), invoker));
    }

    pub fn with(mut self, name: impl Into<String>, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.add(name, invoker);
        self
    }

    /// Names of the registered sources
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Source currently serving `tool`, if routes have been built
    pub fn source_of(&self, tool: &str) -> Option<&str> {
        let index = *self.routes.read().get(tool)?;
        self.sources.get(index).map(|(name, _)| name.as_str())
    }
}

#[async_trait]
impl ToolInvoker for ToolRouter {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut routes = HashMap::new();

        for (index, (source, invoker)) in self.sources.iter().enumerate() {
            match invoker.list_tools().await {
                Ok(list) => {
                    for tool in list {
                        if routes.contains_key(&tool.name) {
                            warn!(tool = %tool.name, source = %source, "Tool already provided by another source");
                            continue;
                        }
                        routes.insert(tool.name.clone(), index);
                        tools.push(tool);
                    }
                }
                Err(e) => {
                    // One unreachable server should not hide the others
                    warn!(source = %source, error = %e, "Failed to list tools");
                }
            }
        }

        debug!(count = tools.len(), "Tool routes rebuilt");
        *self.routes.write() = routes;
        Ok(tools)
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let index = self.routes.read().get(name).copied();
        match index.and_then(|i| self.sources.get(i)) {
            Some((_, invoker)) => invoker.invoke(name, arguments).await,
            None => ToolError::UnknownTool(name.to_string()).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::error::Error;
    use serde_json::json;

    struct Fixed {
        tools: Vec<&'static str>,
        reply: &'static str,
    }

    #[async_trait]
    impl ToolInvoker for Fixed {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Ok(self
                .tools
                .iter()
                .map(|name| ToolDescriptor::new(*name, "", json!({ "type": "object" })))
                .collect())
        }

        async fn invoke(&self, _name: &str, _arguments: Value) -> ToolResult {
            ToolResult::success(Content::text(self.reply))
        }
    }

    struct Down;

    #[async_trait]
    impl ToolInvoker for Down {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Err(Error::Config("server offline".into()))
        }

        async fn invoke(&self, _name: &str, _arguments: Value) -> ToolResult {
            ToolResult::failed("offline")
        }
    }

    fn router() -> ToolRouter {
        ToolRouter::new()
            .with("down", Arc::new(Down))
            .with("jira", Arc::new(Fixed { tools: vec!["tickets", "shared"], reply: "jira" }))
            .with("users", Arc::new(Fixed { tools: vec!["shared", "email_of"], reply: "users" }))
    }

    #[tokio::test]
    async fn test_routes_follow_listing() {
        let router = router();
        let names: Vec<String> = router
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["tickets", "shared", "email_of"]);
        assert_eq!(router.source_of("shared"), Some("jira"));
        assert_eq!(router.source_of("email_of"), Some("users"));

        let result = router.invoke("email_of", json!({})).await;
        assert_eq!(result.content.to_model_text(), "users");
    }

    #[tokio::test]
    async fn test_unrouted_tool_fails_softly() {
        let router = router();
        // Routes are empty until listed
        let result = router.invoke("tickets", json!({})).await;
        assert!(result.is_error);
        assert_eq!(router.source_names(), vec!["down", "jira", "users"]);
    }
}
