//! Model exchange audit log
//!
//! Set `VEIL_LLM_LOG_FILE` to append one JSON line per model call. Only the
//! outbound conversation is written, so the file never holds raw emails.
//!
//! Example: `VEIL_LLM_LOG_FILE=/tmp/veil-llm.log veil chat`

use serde_json::json;
use std::io::Write;
use tracing::{debug, warn};

use super::Completion;
use crate::catalog::ToolCatalog;
use crate::conversation::Conversation;

/// Environment variable naming the log file
pub const LOG_FILE_ENV: &str = "VEIL_LLM_LOG_FILE";

/// What to include in one log entry
#[derive(Default)]
pub struct ExchangeLog<'a> {
    pub model: &'a str,
    pub provider: Option<&'a str>,
    pub conversation: Option<&'a Conversation>,
    pub catalog: Option<&'a ToolCatalog>,
    pub result: Option<&'a Completion>,
    pub error: Option<&'a str>,
}

impl ExchangeLog<'_> {
    pub fn to_json(&self) -> serde_json::Value {
        let messages = self.conversation.map(|c| c.messages()).unwrap_or_default();

        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "model": self.model,
            "provider": self.provider,
            "request": {
                "messages": messages,
                "message_count": messages.len(),
                "tools": self.catalog.map(|c| c.names()),
                "tool_count": self.catalog.map(|c| c.len()).unwrap_or(0),
            },
            "response": self.result.map(|r| match r {
                Completion::FinalAnswer(text) => json!({
                    "type": "message",
                    "content": text,
                }),
                Completion::ToolCallsRequested(calls) => json!({
                    "type": "tool_calls",
                    "tool_calls": calls,
                }),
            }),
            "error": self.error,
        })
    }
}

/// Append an exchange to the log file if `VEIL_LLM_LOG_FILE` is set
pub fn log_model_exchange(entry: ExchangeLog<'_>) {
    let log_file = match std::env::var(LOG_FILE_ENV) {
        Ok(path) => path,
        Err(_) => return,
    };

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(mut file) => {
            let line = serde_json::to_string(&entry.to_json()).unwrap_or_default();
            if let Err(e) = writeln!(file, "{}", line) {
                warn!("Failed to write to LLM log file: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to open LLM log file {}: {}", log_file, e);
        }
    }

    debug!("Logged model exchange to {}", log_file);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolDescriptor;
    use crate::conversation::ToolCall;

    #[test]
    fn test_entry_shape() {
        let mut conversation = Conversation::new();
        conversation.push_user("tickets for EMAIL_0123abcd");
        let catalog = ToolCatalog::new(vec![ToolDescriptor::new(
            "get_tickets_assigned_to_user",
            "Get tickets",
            serde_json::json!({ "type": "object" }),
        )]);
        let result = Completion::ToolCallsRequested(vec![ToolCall::new(
            "c1",
            "get_tickets_assigned_to_user",
            serde_json::json!({ "user_email": "EMAIL_0123abcd" }),
        )]);

        let entry = ExchangeLog {
            model: "gpt-4-turbo",
            conversation: Some(&conversation),
            catalog: Some(&catalog),
            result: Some(&result),
            ..Default::default()
        }
        .to_json();

        assert_eq!(entry["model"], "gpt-4-turbo");
        assert_eq!(entry["request"]["message_count"], 1);
        assert_eq!(entry["request"]["tool_count"], 1);
        assert_eq!(entry["response"]["type"], "tool_calls");
        assert_eq!(entry["response"]["tool_calls"][0]["id"], "c1");
        assert!(entry["error"].is_null());
    }

    #[test]
    fn test_error_entry() {
        let entry = ExchangeLog {
            model: "m",
            error: Some("connection refused"),
            ..Default::default()
        }
        .to_json();
        assert_eq!(entry["error"], "connection refused");
        assert!(entry["response"].is_null());
        assert_eq!(entry["request"]["message_count"], 0);
    }
}
