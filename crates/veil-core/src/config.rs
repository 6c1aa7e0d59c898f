//! Configuration management for Veil
//!
//! Loads and saves `config.toml`: the model provider, redaction settings,
//! the orchestration loop bound and the MCP servers to connect to.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::gateway::ProviderType;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// MCP servers keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

impl Config {
    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.orchestration.max_round_trips == 0 {
            return Err(Error::Config(
                "orchestration.max_round_trips must be at least 1".to_string(),
            ));
        }
        if self.redaction.salt.is_empty() {
            return Err(Error::Config("redaction.salt must not be empty".to_string()));
        }
        self.provider.provider_type()?;
        for (name, server) in &self.mcp_servers {
            server
                .transport()
                .map_err(|e| Error::Config(format!("mcp_servers.{}: {}", name, e)))?;
        }
        Ok(())
    }

    /// Enabled MCP servers, by name
    pub fn enabled_mcp_servers(&self) -> impl Iterator<Item = (&String, &McpServerConfig)> {
        self.mcp_servers.iter().filter(|(_, server)| server.enabled)
    }
}

/// LLM Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider type: "openai", "anthropic", "gemini", ...
    pub provider_type: String,
    pub model: String,
    /// API key (can be loaded from env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable name for API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "openai".to_string(),
            model: "gpt-4-turbo".to_string(),
            api_key: None,
            api_key_env: None,
            max_tokens: 1000,
            system_prompt: None,
        }
    }
}

impl ProviderConfig {
    pub fn provider_type(&self) -> Result<ProviderType> {
        self.provider_type.parse().map_err(Error::Config)
    }

    /// Get the API key, checking environment variables if not set directly
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }

        if let Some(env_name) = &self.api_key_env {
            if let Ok(key) = std::env::var(env_name) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }

        // Conventional variable for the provider
        self.provider_type()
            .ok()
            .and_then(|p| p.api_key_env())
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Which sessions share a redaction store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreScope {
    /// Each session owns its own store
    #[default]
    Session,
    /// One store for the whole process
    Process,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Secret mixed into every token hash
    pub salt: String,
    pub scope: StoreScope,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            salt: "your_app_specific_salt".to_string(),
            scope: StoreScope::Session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Model/tool round trips allowed per turn
    pub max_round_trips: usize,
    /// Run the tool calls of one round concurrently
    pub parallel_tool_calls: bool,
    /// Collect `[Calling tool ...]` lines for the caller
    pub tool_trace: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_round_trips: 10,
            parallel_tool_calls: false,
            tool_trace: true,
        }
    }
}

/// One MCP server, reached over stdio or HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to spawn (stdio transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment for the spawned command, e.g. `API_KEY`, `CONFIG_PATH`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Endpoint (streamable HTTP transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extra request headers, e.g. `api_key`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Environment variable holding a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// How an MCP server is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransportKind {
    Stdio,
    Http,
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            bearer_token_env: None,
            enabled: true,
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
            bearer_token_env: None,
            enabled: true,
        }
    }

    /// Exactly one of `command` and `url` must be set
    pub fn transport(&self) -> std::result::Result<McpTransportKind, String> {
        match (&self.command, &self.url) {
            (Some(_), None) => Ok(McpTransportKind::Stdio),
            (None, Some(_)) => Ok(McpTransportKind::Http),
            (Some(_), Some(_)) => Err("set either command or url, not both".to_string()),
            (None, None) => Err("either command or url is required".to_string()),
        }
    }

    /// Bearer token from `bearer_token_env`, if set and present
    pub fn bearer_token(&self) -> Option<String> {
        self.bearer_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty())
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with the default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path. A missing file yields defaults.
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("veil").join("config.toml"))
    }

    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.provider_type, "openai");
        assert_eq!(config.provider.model, "gpt-4-turbo");
        assert_eq!(config.provider.max_tokens, 1000);
        assert_eq!(config.redaction.salt, "your_app_specific_salt");
        assert_eq!(config.redaction.scope, StoreScope::Session);
        assert_eq!(config.orchestration.max_round_trips, 10);
        assert!(!config.orchestration.parallel_tool_calls);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [orchestration]
            max_round_trips = 3

            [mcp_servers.jira]
            command = "veil"
            args = ["serve-demo"]
            env = { API_KEY = "abc" }

            [mcp_servers.weather]
            url = "http://localhost:8000/mcp"
            headers = { api_key = "xyz" }
            bearer_token_env = "WEATHER_TOKEN"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestration.max_round_trips, 3);
        assert!(config.orchestration.tool_trace);
        assert_eq!(config.provider.model, "gpt-4-turbo");

        let jira = &config.mcp_servers["jira"];
        assert_eq!(jira.transport(), Ok(McpTransportKind::Stdio));
        assert_eq!(jira.env["API_KEY"], "abc");
        assert!(jira.enabled);

        let weather = &config.mcp_servers["weather"];
        assert_eq!(weather.transport(), Ok(McpTransportKind::Http));
        assert_eq!(weather.headers["api_key"], "xyz");

        let enabled: Vec<&String> = config.enabled_mcp_servers().map(|(name, _)| name).collect();
        assert_eq!(enabled, vec!["jira"]);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.orchestration.max_round_trips = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.provider.provider_type = "carrier-pigeon".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        let mut server = McpServerConfig::http("http://localhost:8000/mcp");
        server.command = Some("also".into());
        config.mcp_servers.insert("both".into(), server);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("mcp_servers.both"));
    }

    #[test]
    fn test_scope_serialization() {
        let config: Config = toml::from_str("[redaction]\nscope = \"process\"\n").unwrap();
        assert_eq!(config.redaction.scope, StoreScope::Process);
        assert_eq!(config.redaction.salt, "your_app_specific_salt");
    }

    #[test]
    fn test_api_key_from_env() {
        let config = ProviderConfig {
            api_key_env: Some("VEIL_TEST_API_KEY_12345".to_string()),
            ..Default::default()
        };

        unsafe { std::env::set_var("VEIL_TEST_API_KEY_12345", "test-key") };
        assert_eq!(config.get_api_key(), Some("test-key".to_string()));
        unsafe { std::env::remove_var("VEIL_TEST_API_KEY_12345") };
    }

    #[test]
    fn test_direct_api_key_wins() {
        let config = ProviderConfig {
            api_key: Some("direct".to_string()),
            api_key_env: Some("VEIL_TEST_UNUSED_KEY".to_string()),
            ..Default::default()
        };
        assert_eq!(config.get_api_key(), Some("direct".to_string()));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut manager = ConfigManager::with_path(path.clone()).unwrap();
        assert_eq!(manager.config(), &Config::default());

        manager.config_mut().redaction.salt = "pepper".to_string();
        manager
            .config_mut()
            .mcp_servers
            .insert("jira".into(), McpServerConfig::stdio("veil", vec!["serve-demo".into()]));
        manager.save().unwrap();

        let reloaded = ConfigManager::with_path(path).unwrap();
        assert_eq!(reloaded.config().redaction.salt, "pepper");
        assert_eq!(
            reloaded.config().mcp_servers["jira"].command.as_deref(),
            Some("veil")
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        assert!(matches!(ConfigManager::with_path(path), Err(Error::Config(_))));
    }
}
