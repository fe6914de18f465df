//! Configuration loading, validation, and management for Foreman.
//!
//! Loads configuration from `~/.foreman/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Environment variables (all optional):
//!
//! | Variable | Field |
//! |---|---|
//! | `MCP_SERVER_URL` | `gateway.url` |
//! | `MCP_AUTH_MODE` | `gateway.auth_mode` (`iam` or `none`) |
//! | `AWS_REGION` | `gateway.region`, `knowledge_base.region` |
//! | `CONTEXT_API_URL` | `context.base_url` |
//! | `KNOWLEDGE_BASE_ID` | `knowledge_base.id` |
//! | `FOREMAN_API_KEY` / `OPENAI_API_KEY` | `model.api_key` |
//! | `FOREMAN_MODEL` | `model.model_id` |
//! | `FOREMAN_PROVIDER_URL` | `model.base_url` |
//! | `PORT` | `server.port` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.foreman/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generative model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Remote tool gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Fallback context service
    #[serde(default)]
    pub context: ContextConfig,

    /// Local retrieval tool
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,

    /// HTTP runtime surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name, used for logging and default base URLs
    #[serde(default = "default_provider")]
    pub provider: String,

    /// OpenAI-compatible endpoint; defaults per provider when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model_id() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            model_id: default_model_id(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// How requests to the tool gateway are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// SigV4-signed requests using ambient AWS credentials
    Iam,
    /// Plain, unauthenticated requests
    None,
}

impl AuthMode {
    /// Parse the `MCP_AUTH_MODE` value.
    ///
    /// Anything other than `iam` selects the unauthenticated transport.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "iam" => AuthMode::Iam,
            "none" => AuthMode::None,
            other => {
                tracing::warn!(mode = %other, "Unknown gateway auth mode, using unauthenticated transport");
                AuthMode::None
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Iam => "iam",
            AuthMode::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway endpoint; empty means "not configured"
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_auth_mode")]
    pub auth_mode: AuthMode,

    #[serde(default = "default_region")]
    pub region: String,

    /// SigV4 service name for the `iam` mode
    #[serde(default = "default_gateway_service")]
    pub service: String,
}

fn default_auth_mode() -> AuthMode {
    AuthMode::Iam
}
fn default_region() -> String {
    "us-east-1".into()
}
fn default_gateway_service() -> String {
    "bedrock-agentcore".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_mode: default_auth_mode(),
            region: default_region(),
            service: default_gateway_service(),
        }
    }
}

impl GatewayConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_context_url")]
    pub base_url: String,
}

fn default_context_url() -> String {
    "http://localhost:3000".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            base_url: default_context_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Knowledge base id; retrieval reports "not configured" when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides the regional endpoint (tests, VPC endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_top_k() -> u32 {
    5
}
fn default_min_score() -> f64 {
    0.4
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            id: None,
            region: default_region(),
            endpoint: None,
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Replaces the packaged instruction text when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<PathBuf>,

    /// Maximum model turns per invocation (tool round-trips + final answer)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt_file: None,
            max_iterations: default_max_iterations(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Empty values count as unset, except `MCP_SERVER_URL`, where an empty
    /// value explicitly disables the gateway.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("MCP_SERVER_URL") {
            self.gateway.url = url.trim().to_string();
        }
        if let Some(mode) = non_empty("MCP_AUTH_MODE") {
            self.gateway.auth_mode = AuthMode::parse(&mode);
        }
        if let Some(region) = non_empty("AWS_REGION") {
            self.gateway.region = region.clone();
            self.knowledge_base.region = region;
        }
        if let Some(url) = non_empty("CONTEXT_API_URL") {
            self.context.base_url = url;
        }
        if let Some(id) = non_empty("KNOWLEDGE_BASE_ID") {
            self.knowledge_base.id = Some(id);
        }
        if let Some(key) = non_empty("FOREMAN_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = non_empty("FOREMAN_MODEL") {
            self.model.model_id = model;
        }
        if let Some(url) = non_empty("FOREMAN_PROVIDER_URL") {
            self.model.base_url = Some(url);
        }
        if let Some(port) = non_empty("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".foreman")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.knowledge_base.min_score) {
            return Err(ConfigError::ValidationError(
                "knowledge_base.min_score must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
