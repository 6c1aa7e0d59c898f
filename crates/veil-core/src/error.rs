//! Error types for Veil Core

use thiserror::Error;

/// Result type alias using Veil Error
pub type Result<T> = std::result::Result<T, Error>;

/// Veil error types
///
/// `ModelUnavailable`, `InvalidModelResponse`, `ToolCallLoopExceeded` and
/// `Cancelled` end the current turn. Tool failures never surface here from
/// the loop; they become tool messages instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid model response: {0}")]
    InvalidModelResponse(String),

    #[error("Tool call loop exceeded {limit} round trips")]
    ToolCallLoopExceeded { limit: usize },

    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("Redaction error: {0}")]
    Redaction(#[from] RedactionError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error ends the turn (as opposed to a recoverable tool failure)
    pub fn is_fatal_to_turn(&self) -> bool {
        !matches!(self, Error::Tool(_))
    }
}

/// Tool-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Redaction store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedactionError {
    #[error("Token {token} already maps to a different address")]
    TokenCollision { token: String, existing: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::ToolCallLoopExceeded { limit: 3 }.to_string(),
            "Tool call loop exceeded 3 round trips"
        );
        assert_eq!(
            Error::from(ToolError::UnknownTool("x".into())).to_string(),
            "Tool error: Unknown tool: x"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(Error::ModelUnavailable("down".into()).is_fatal_to_turn());
        assert!(Error::Cancelled.is_fatal_to_turn());
        assert!(!Error::Tool(ToolError::ExecutionFailed("boom".into())).is_fatal_to_turn());
    }
}
