//! Model Backends
//!
//! `LLMProvider` is the one seam between agents and a model server. Ollama
//! and OpenAI-compatible servers are supported; both honour the configured
//! sampling temperature.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};
use ollama_rs::models::ModelOptions;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

use super::{CachedProvider, LLMCache};
use crate::config::{ProviderConfig, ProviderKind};

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String>;

    /// Drop a stored reply for this request so the next call reaches the model.
    /// Only caching providers hold replies.
    async fn forget(&self, _model: &str, _prompt: &str, _system: Option<&str>) {}
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
    /// Unset leaves the model's own default in place
    temperature: Option<f32>,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama) -> Self {
        Self { client, temperature: None }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn request(&self, model: &str, prompt: String, system: Option<String>) -> ChatMessageRequest {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(ChatMessage::system(sys));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatMessageRequest::new(model.to_string(), messages);
        match self.temperature {
            Some(t) => request.options(ModelOptions::default().temperature(t)),
            None => request,
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String> {
        let res = self.client.send_chat_messages(self.request(model, prompt, system)).await?;

        Ok(res.message.content)
    }
}

/// Any server that speaks the `/chat/completions` protocol
pub struct OpenAICompatibleProvider {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn body(&self, model: &str, prompt: String, system: Option<String>) -> serde_json::Value {
        let messages: Vec<_> = system
            .map(|sys| json!({ "role": "system", "content": sys }))
            .into_iter()
            .chain(std::iter::once(json!({ "role": "user", "content": prompt })))
            .collect();
        json!({ "model": model, "messages": messages, "temperature": self.temperature })
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String> {
        let mut request = self.http.post(&self.endpoint).json(&self.body(model, prompt, system));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let reply: serde_json::Value = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.endpoint))?
            .error_for_status()?
            .json()
            .await?;

        reply["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .with_context(|| format!("No message content in reply from {}", self.endpoint))
    }
}

/// Build the configured backend, wrapped in a response cache when enabled
pub fn build_provider(config: &ProviderConfig) -> Arc<dyn LLMProvider> {
    let provider: Arc<dyn LLMProvider> = match config.kind {
        ProviderKind::Ollama => {
            let client = ollama_rs::Ollama::new(config.base_url.clone(), config.port);
            Arc::new(OllamaProvider::new(client).with_temperature(config.temperature))
        }
        ProviderKind::OpenAiCompatible => Arc::new(
            OpenAICompatibleProvider::new(config.base_url.clone(), config.api_key.clone())
                .with_temperature(config.temperature),
        ),
    };

    if config.cache_responses {
        Arc::new(CachedProvider::new(provider, Arc::new(LLMCache::new())))
    } else {
        provider
    }
}
