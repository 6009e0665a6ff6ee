// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM provider implementations

pub mod anthropic;
mod common;
pub mod ollama;
pub mod openai;
pub mod openrouter;

use async_trait::async_trait;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

use crate::config::Settings;
use crate::error::{NexusError, Result};
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, ProviderKind,
};

/// The closed set of supported providers
pub enum ProviderClient {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    Ollama(OllamaProvider),
    OpenRouter(OpenRouterProvider),
}

impl ProviderClient {
    /// Build the client for `kind` from settings.
    ///
    /// Fails with `Config` when the provider is disabled or needs a key
    /// that is not configured.
    pub fn from_settings(kind: ProviderKind, settings: &Settings) -> Result<Self> {
        let config = settings.providers.get(kind);
        if !config.enabled {
            return Err(NexusError::Config(format!("provider '{}' is disabled", kind)));
        }
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());

        let require_key = || {
            settings.api_key(kind).ok_or_else(|| {
                let hint = config
                    .api_key_env
                    .as_deref()
                    .map(|var| format!("set {} or providers.{}.api_key", var, kind))
                    .unwrap_or_else(|| format!("set providers.{}.api_key", kind));
                NexusError::Config(format!("no API key for '{}': {}", kind, hint))
            })
        };

        Ok(match kind {
            ProviderKind::OpenAi => {
                ProviderClient::OpenAi(OpenAiProvider::with_base_url(require_key()?, base_url))
            }
            ProviderKind::Anthropic => ProviderClient::Anthropic(AnthropicProvider::with_base_url(
                require_key()?,
                base_url,
            )),
            ProviderKind::OpenRouter => ProviderClient::OpenRouter(
                OpenRouterProvider::with_base_url(require_key()?, base_url),
            ),
            ProviderKind::Ollama => ProviderClient::Ollama(OllamaProvider::with_base_url(base_url)),
        })
    }

    fn inner(&self) -> &dyn LlmProvider {
        match self {
            ProviderClient::OpenAi(p) => p,
            ProviderClient::Anthropic(p) => p,
            ProviderClient::Ollama(p) => p,
            ProviderClient::OpenRouter(p) => p,
        }
    }
}

#[async_trait]
impl LlmProvider for ProviderClient {
    fn kind(&self) -> ProviderKind {
        self.inner().kind()
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.inner().available_models()
    }

    fn supports_model(&self, model: &str) -> bool {
        self.inner().supports_model(model)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.inner().complete(request).await
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        self.inner().complete_stream(request).await
    }
}
