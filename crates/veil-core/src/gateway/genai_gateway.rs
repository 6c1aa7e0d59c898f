//! GenAI-backed model gateway
//!
//! Maps the conversation onto genai chat messages, streams the response and
//! folds it back into a `Completion`.

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{
    ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent, Tool, ToolCall as GenAIToolCall,
    ToolResponse,
};
use genai::resolver::{AuthData, AuthResolver};
use genai::Client;
use genai::WebConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::logging::{log_model_exchange, ExchangeLog};
use super::{Completion, ModelGateway};
use crate::catalog::ToolCatalog;
use crate::config::ProviderConfig;
use crate::conversation::{Conversation, MessageContent, Role, ToolCall};
use crate::error::{Error, Result};

/// Supported LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// OpenAI (GPT-4, GPT-4o, etc.)
    OpenAI,
    /// Anthropic (Claude)
    Anthropic,
    /// Google Gemini
    Gemini,
    /// Groq (fast inference)
    Groq,
    /// DeepSeek
    DeepSeek,
    /// Ollama (local)
    Ollama,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "groq" => Ok(ProviderType::Groq),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Groq => "groq",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "gpt-4-turbo",
            ProviderType::Anthropic => "claude-sonnet-4-20250514",
            ProviderType::Gemini => "gemini-2.0-flash",
            ProviderType::Groq => "llama-3.3-70b-versatile",
            ProviderType::DeepSeek => "deepseek-chat",
            ProviderType::Ollama => "llama3.2",
        }
    }

    /// Conventional environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Gemini => Some("GEMINI_API_KEY"),
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderType::Ollama => None,
        }
    }
}

/// A `ModelGateway` using genai
pub struct GenAIGateway {
    client: Client,
    provider_type: ProviderType,
    model: String,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
}

impl GenAIGateway {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a gateway that resolves credentials from the environment
    pub fn new(provider_type: ProviderType, model: Option<&str>) -> Self {
        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .build();
        Self::from_client(client, provider_type, model)
    }

    /// Create a gateway with a specific API key
    pub fn with_api_key(provider_type: ProviderType, api_key: &str, model: Option<&str>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();
        Self::from_client(client, provider_type, model)
    }

    fn from_client(client: Client, provider_type: ProviderType, model: Option<&str>) -> Self {
        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
            system_prompt: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    /// Build a gateway from provider settings
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let provider_type = config.provider_type()?;
        let model = Some(config.model.as_str()).filter(|m| !m.is_empty());

        let gateway = match config.get_api_key() {
            Some(key) => Self::with_api_key(provider_type, &key, model),
            None if provider_type == ProviderType::Ollama => Self::new(provider_type, model),
            None => {
                return Err(Error::Config(format!(
                    "No API key for provider '{}'. Set {} or provider.api_key",
                    provider_type,
                    provider_type.api_key_env().unwrap_or("provider.api_key_env")
                )));
            }
        };

        let gateway = gateway.with_max_tokens(config.max_tokens);
        Ok(match &config.system_prompt {
            Some(prompt) => gateway.with_system_prompt(prompt.clone()),
            None => gateway,
        })
    }

    /// Build the genai request. History and tool results are sent as stored,
    /// i.e. already redacted.
    fn build_request(&self, conversation: &Conversation, catalog: &ToolCatalog) -> ChatRequest {
        let mut chat_req = ChatRequest::default();

        if let Some(system) = &self.system_prompt {
            chat_req = chat_req.with_system(system.as_str());
        }

        for message in conversation.messages() {
            chat_req = match &message.content {
                MessageContent::Text { text } => match message.role {
                    Role::Assistant => {
                        chat_req.append_message(ChatMessage::assistant(text))
                    }
                    _ => chat_req.append_message(ChatMessage::user(text)),
                },
                MessageContent::ToolCalls { calls } => {
                    let genai_calls: Vec<GenAIToolCall> = calls
                        .iter()
                        .map(|call| GenAIToolCall {
                            call_id: call.id.clone(),
                            fn_name: call.name.clone(),
                            fn_arguments: call.arguments.clone(),
                            thought_signatures: None,
                        })
                        .collect();
                    chat_req.append_message(genai_calls)
                }
                MessageContent::ToolResult {
                    call_id, content, ..
                } => chat_req.append_message(ToolResponse::new(
                    call_id.clone(),
                    content.to_model_text(),
                )),
            };
        }

        if !catalog.is_empty() {
            let tools: Vec<Tool> = catalog
                .iter()
                .map(|t| {
                    Tool::new(&t.name)
                        .with_description(&t.description)
                        .with_schema(t.parameters.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(tools);
        }

        chat_req
    }

    async fn stream_completion(&self, chat_req: ChatRequest) -> Result<(Option<String>, Vec<ToolCall>)> {
        let options = self
            .max_tokens
            .map(|max| ChatOptions::default().with_max_tokens(max));

        let stream_response = self
            .client
            .exec_chat_stream(&self.model, chat_req, options.as_ref())
            .await
            .map_err(|e| {
                error!(error = ?e, model = %self.model, "LLM request failed");
                Error::ModelUnavailable(format!("GenAI error: {:?}", e))
            })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut stream = stream_response.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    content.push_str(&chunk.content);
                }
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    // Each ToolCallChunk carries a complete call
                    let call = tc.tool_call;
                    tool_calls.push(ToolCall::new(call.call_id, call.fn_name, call.fn_arguments));
                }
                Ok(ChatStreamEvent::End(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    error!(error = ?e, model = %self.model, "LLM stream error");
                    return Err(Error::ModelUnavailable(format!("GenAI stream error: {:?}", e)));
                }
            }
        }

        let content = if content.is_empty() { None } else { Some(content) };
        Ok((content, tool_calls))
    }
}

#[async_trait]
impl ModelGateway for GenAIGateway {
    async fn complete(&self, conversation: &Conversation, catalog: &ToolCatalog) -> Result<Completion> {
        let chat_req = self.build_request(conversation, catalog);
        debug!(
            model = %self.model,
            messages = conversation.len(),
            tools = catalog.len(),
            "Sending completion request"
        );

        let result = self
            .stream_completion(chat_req)
            .await
            .and_then(|(text, calls)| Completion::from_parts(text, calls));

        let error = result.as_ref().err().map(|e| e.to_string());
        log_model_exchange(ExchangeLog {
            model: &self.model,
            provider: Some(self.provider_type.as_str()),
            conversation: Some(conversation),
            catalog: Some(catalog),
            result: result.as_ref().ok(),
            error: error.as_deref(),
        });

        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}
