//! Language model gateway
//!
//! A `ModelGateway` takes the (already redacted) conversation plus the tool
//! catalog and answers with either final text or a list of tool calls. The
//! genai-backed implementation lives in `genai_gateway`; tests supply their own.

mod genai_gateway;
mod logging;

pub use genai_gateway::{GenAIGateway, ProviderType};
pub use logging::{log_model_exchange, ExchangeLog, LOG_FILE_ENV};

use async_trait::async_trait;

use crate::catalog::ToolCatalog;
use crate::conversation::{Conversation, ToolCall};
use crate::error::{Error, Result};

/// What the model asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    FinalAnswer(String),
    ToolCallsRequested(Vec<ToolCall>),
}

impl Completion {
    /// Interpret raw response parts.
    ///
    /// Tool calls take precedence over text. A response with neither is
    /// rejected as `InvalidModelResponse`.
    pub fn from_parts(text: Option<String>, tool_calls: Vec<ToolCall>) -> Result<Self> {
        if !tool_calls.is_empty() {
            if let Some(call) = tool_calls.iter().find(|c| c.id.is_empty() || c.name.is_empty()) {
                return Err(Error::InvalidModelResponse(format!(
                    "tool call missing id or name: {:?}",
                    call
                )));
            }
            return Ok(Completion::ToolCallsRequested(tool_calls));
        }

        match text {
            Some(text) if !text.trim().is_empty() => Ok(Completion::FinalAnswer(text)),
            _ => Err(Error::InvalidModelResponse(
                "response has neither text nor tool calls".to_string(),
            )),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Completion::FinalAnswer(_))
    }
}

/// Sends a conversation to a language model
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Ask the model for its next step.
    ///
    /// Must not touch the redaction store. Upstream failures map to
    /// `Error::ModelUnavailable`, unusable responses to
    /// `Error::InvalidModelResponse`.
    async fn complete(&self, conversation: &Conversation, catalog: &ToolCatalog) -> Result<Completion>;

    /// Model identifier, for logs
    fn model(&self) -> &str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_calls_take_precedence() {
        let completion = Completion::from_parts(
            Some("let me check".into()),
            vec![ToolCall::new("c1", "lookup", json!({}))],
        )
        .unwrap();
        assert!(matches!(completion, Completion::ToolCallsRequested(ref calls) if calls.len() == 1));
        assert!(!completion.is_final());
    }

    #[test]
    fn test_text_only_is_final() {
        let completion = Completion::from_parts(Some("done".into()), vec![]).unwrap();
        assert_eq!(completion, Completion::FinalAnswer("done".into()));
    }

    #[test]
    fn test_empty_response_is_invalid() {
        for text in [None, Some(String::new()), Some("  \n".into())] {
            let err = Completion::from_parts(text, vec![]).unwrap_err();
            assert!(matches!(err, Error::InvalidModelResponse(_)));
        }
    }

    #[test]
    fn test_tool_call_without_id_is_invalid() {
        let err = Completion::from_parts(None, vec![ToolCall::new("", "lookup", json!({}))])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidModelResponse(_)));
    }
}
