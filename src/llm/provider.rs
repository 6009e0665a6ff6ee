// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and related types
//!
//! Defines the abstraction layer for different LLM backends.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use crate::error::{ApiError, NexusError, Result};
use crate::llm::message::ChatMessage;

/// The provider families Nexus can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Ollama,
    OpenRouter,
}

impl ProviderKind {
    /// Every kind, in model-resolution order
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::OpenRouter,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => Err(NexusError::InvalidInput(format!(
                "unknown provider '{}' (expected openai, anthropic, ollama or openrouter)",
                other
            ))),
        }
    }
}

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Which provider family this is
    fn kind(&self) -> ProviderKind;

    /// Get the provider name (e.g., "anthropic", "openai")
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// List available models
    fn available_models(&self) -> Vec<ModelInfo>;

    /// Check if a specific model is supported
    fn supports_model(&self, model: &str) -> bool {
        self.available_models().iter().any(|m| m.id == model)
    }

    /// Non-streaming completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming completion
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream>;

    /// Dispatch according to `request.stream`. A non-streaming response is
    /// delivered as one `Delta` followed by `Done`.
    async fn send(&self, request: CompletionRequest) -> Result<ChunkStream> {
        if request.stream {
            return self.complete_stream(request).await;
        }
        let response = self.complete(request).await?;
        Ok(single_response_stream(response))
    }
}

/// Pull-based stream of response chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = ResponseChunk> + Send>>;

/// One item of a provider response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseChunk {
    /// Next piece of generated text
    Delta(String),
    /// Generation finished normally
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    /// Generation failed after the request was accepted
    Error(ApiError),
}

/// Request for completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Pin the request to one provider instead of resolving from the model
    pub provider: Option<ProviderKind>,

    /// Messages in the conversation
    pub messages: Vec<ChatMessage>,

    /// System prompt
    pub system: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Stream the response incrementally
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            provider: None,
            messages,
            system: None,
            temperature: 0.7,
            max_tokens: 2000,
            stream: true,
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Model used
    pub model: String,

    /// Generated text
    pub content: String,

    /// Token usage, when reported
    pub usage: Option<Usage>,

    /// Provider's stop reason
    pub finish_reason: Option<String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Information about a model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model identifier
    pub id: String,

    /// Human-readable name
    pub display_name: String,

    /// Maximum context window in tokens
    pub context_window: u32,
}

impl ModelInfo {
    pub fn new(id: &str, display_name: &str, context_window: u32) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            context_window,
        }
    }
}

/// Wrap a complete response as `Delta` + `Done`.
pub fn single_response_stream(response: CompletionResponse) -> ChunkStream {
    let mut chunks = Vec::with_capacity(2);
    if !response.content.is_empty() {
        chunks.push(ResponseChunk::Delta(response.content));
    }
    chunks.push(ResponseChunk::Done {
        usage: response.usage,
        finish_reason: response.finish_reason,
    });
    Box::pin(futures::stream::iter(chunks))
}
