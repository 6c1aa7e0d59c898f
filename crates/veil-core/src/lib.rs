//! Veil Core - tool-calling orchestration with email redaction
//!
//! This crate provides the core functionality for Veil:
//! - Reversible email redaction over text and nested tool content
//! - The orchestration loop driving a model through tool calls
//! - Model gateway and tool invoker abstractions, with genai and MCP backends
//! - Configuration

pub mod catalog;
pub mod config;
pub mod content;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod invoker;
pub mod redaction;
pub mod session;

pub use catalog::{ToolCatalog, ToolDescriptor};
pub use config::{
    Config, ConfigManager, McpServerConfig, OrchestrationConfig, ProviderConfig, RedactionConfig,
    StoreScope,
};
pub use content::{Content, ContentItem};
pub use conversation::{Conversation, Message, MessageContent, Role, ToolCall};
pub use error::{Error, RedactionError, Result, ToolError};
pub use gateway::{Completion, GenAIGateway, ModelGateway, ProviderType};
pub use invoker::{Tool, ToolInvoker, ToolRegistry, ToolResult, ToolRouter};
pub use redaction::{RedactionCodec, RedactionStore};
pub use session::{
    LoopState, Session, SessionId, SessionManager, TurnEvent, TurnOutcome,
};
