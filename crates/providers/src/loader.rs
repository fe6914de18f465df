//! Model loader: turns `[model]` configuration into a ready handle.
//!
//! Loading is synchronous and does no I/O: the provider client is built and
//! credentials are attached, but nothing is contacted until the first
//! request. A bad key therefore surfaces as a generation failure.

use std::sync::Arc;

use foreman_config::ModelConfig;
use foreman_core::provider::{Provider, ProviderRequest, ToolDefinition};
use foreman_core::message::Message;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// A provider bound to a model id and sampling parameters.
#[derive(Clone)]
pub struct ModelHandle {
    pub provider: Arc<dyn Provider>,
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelHandle {
    pub fn new(provider: Arc<dyn Provider>, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            temperature: 0.3,
            max_tokens: None,
        }
    }

    /// Build a request for this model.
    pub fn request(
        &self,
        system: Option<String>,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> ProviderRequest {
        ProviderRequest {
            model: self.model_id.clone(),
            system,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider.name())
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Build the model handle described by `config`.
pub fn load_model(config: &ModelConfig) -> ModelHandle {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));
    let api_key = config.api_key.clone().unwrap_or_default();

    debug!(provider = %config.provider, model = %config.model_id, base_url = %base_url, "Loading model");

    let provider: Arc<dyn Provider> =
        Arc::new(OpenAiCompatProvider::new(&config.provider, base_url, api_key));

    ModelHandle {
        provider,
        model_id: config.model_id.clone(),
        temperature: config.temperature,
        max_tokens: (config.max_tokens > 0).then_some(config.max_tokens),
    }
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
