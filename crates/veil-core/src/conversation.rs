//! Conversation history
//!
//! An ordered list of user, assistant and tool messages. The history held by
//! a session only ever contains redacted text; the local-only copies of
//! emails live in the redaction store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::error::{Error, Result};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Argument payload. Only its string leaves are ever rewritten.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// What a message carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ToolCalls {
        calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: Content,
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text { text: text.into() })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text { text: text.into() })
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(Role::Assistant, MessageContent::ToolCalls { calls })
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Content,
        is_error: bool,
    ) -> Self {
        Self::new(
            Role::Tool,
            MessageContent::ToolResult {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
                content,
                is_error,
            },
        )
    }

    /// Text body, if this is a plain text message
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Ordered message history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    pub fn push_tool_calls(&mut self, calls: Vec<ToolCall>) {
        self.messages.push(Message::tool_calls(calls));
    }

    /// Append a tool result.
    ///
    /// `call_id` must belong to the nearest preceding assistant tool-call
    /// message and must not have been answered already. Calls sharing an id
    /// each take one result.
    pub fn push_tool_result(
        &mut self,
        call_id: &str,
        tool_name: &str,
        content: Content,
        is_error: bool,
    ) -> Result<()> {
        if !self.pending_call_ids().iter().any(|id| id == call_id) {
            return Err(Error::Conversation(format!(
                "tool result for '{}' does not answer a pending tool call",
                call_id
            )));
        }
        self.messages
            .push(Message::tool_result(call_id, tool_name, content, is_error));
        Ok(())
    }

    /// Ids from the latest tool-call message that have no result yet, in
    /// request order. A result answers the first unanswered call with its id,
    /// so a repeated id stays pending until every occurrence is answered.
    pub fn pending_call_ids(&self) -> Vec<String> {
        let mut answered: Vec<&str> = Vec::new();
        for message in self.messages.iter().rev() {
            match &message.content {
                MessageContent::ToolResult { call_id, .. } => answered.push(call_id.as_str()),
                MessageContent::ToolCalls { calls } => {
                    return calls
                        .iter()
                        .filter(|call| {
                            match answered.iter().position(|id| *id == call.id) {
                                Some(index) => {
                                    answered.swap_remove(index);
                                    false
                                }
                                None => true,
                            }
                        })
                        .map(|call| call.id.clone())
                        .collect();
                }
                MessageContent::Text { .. } => break,
            }
        }
        Vec::new()
    }

    /// Append every message of `other`
    pub fn extend(&mut self, other: Conversation) {
        self.messages.extend(other.messages);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_calls() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push_user("tickets for EMAIL_0123abcd");
        conversation.push_tool_calls(vec![
            ToolCall::new("call_1", "lookup", json!({})),
            ToolCall::new("call_2", "lookup", json!({})),
        ]);
        conversation
    }

    #[test]
    fn test_tool_result_must_match_pending_call() {
        let mut conversation = with_calls();
        assert_eq!(conversation.pending_call_ids(), vec!["call_1", "call_2"]);

        conversation
            .push_tool_result("call_1", "lookup", Content::text("ok"), false)
            .unwrap();
        assert_eq!(conversation.pending_call_ids(), vec!["call_2"]);

        // Already answered
        let err = conversation
            .push_tool_result("call_1", "lookup", Content::text("again"), false)
            .unwrap_err();
        assert!(matches!(err, Error::Conversation(_)));

        // Never requested
        assert!(conversation
            .push_tool_result("call_9", "lookup", Content::text("x"), false)
            .is_err());
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_repeated_call_ids_each_take_a_result() {
        let mut conversation = Conversation::new();
        conversation.push_user("tickets for two users");
        conversation.push_tool_calls(vec![
            ToolCall::new("lookup", "lookup", json!({ "user": "a" })),
            ToolCall::new("lookup", "lookup", json!({ "user": "b" })),
        ]);
        assert_eq!(conversation.pending_call_ids(), vec!["lookup", "lookup"]);

        conversation
            .push_tool_result("lookup", "lookup", Content::text("a"), false)
            .unwrap();
        assert_eq!(conversation.pending_call_ids(), vec!["lookup"]);
        conversation
            .push_tool_result("lookup", "lookup", Content::text("b"), false)
            .unwrap();
        assert!(conversation.pending_call_ids().is_empty());

        assert!(conversation
            .push_tool_result("lookup", "lookup", Content::text("c"), false)
            .is_err());
        assert_eq!(conversation.len(), 4);
    }

    #[test]
    fn test_no_pending_after_text() {
        let mut conversation = with_calls();
        conversation.push_assistant("done");
        assert!(conversation.pending_call_ids().is_empty());
        assert!(conversation
            .push_tool_result("call_1", "lookup", Content::text("late"), false)
            .is_err());
    }

    #[test]
    fn test_roles() {
        let conversation = with_calls();
        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(conversation.messages()[0].text(), Some("tickets for EMAIL_0123abcd"));
    }

    #[test]
    fn test_serialization() {
        let mut conversation = with_calls();
        conversation
            .push_tool_result("call_2", "lookup", Content::text_items("none"), true)
            .unwrap();

        let json = serde_json::to_value(&conversation).unwrap();
        let tool = &json["messages"][2];
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["content"]["kind"], "tool_result");
        assert_eq!(tool["content"]["content"][0]["text"], "none");

        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back, conversation);
    }
}
