// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenRouter provider implementation
//!
//! OpenRouter exposes 100+ models behind an OpenAI-compatible API, addressed
//! as `vendor/model`.

use async_trait::async_trait;
use reqwest::Client;

use super::common::{line_stream, parse_retry_after, transport_error};
use super::openai::{build_chat_body, parse_chat_response, parse_error, ChatCompletionBody, ChatSseDecoder};
use crate::error::Result;
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, ProviderKind,
};

// Attribution headers for OpenRouter rankings
const SITE_URL: &str = "https://github.com/nexus-ai/nexus";
const SITE_NAME: &str = "Nexus AI CLI";

/// OpenRouter provider - access to 100+ models via single API
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, ProviderKind::OpenRouter.default_base_url())
    }

    /// Create with a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, body: &ChatCompletionBody<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", SITE_URL)
            .header("X-Title", SITE_NAME)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, retry_after).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        // A curated subset; any vendor/model id is accepted
        vec![
            ModelInfo::new("anthropic/claude-sonnet-4", "Claude Sonnet 4 (via OpenRouter)", 200_000),
            ModelInfo::new("anthropic/claude-3.5-haiku", "Claude 3.5 Haiku (via OpenRouter)", 200_000),
            ModelInfo::new("openai/gpt-4o", "GPT-4o (via OpenRouter)", 128_000),
            ModelInfo::new("openai/gpt-4o-mini", "GPT-4o Mini (via OpenRouter)", 128_000),
            ModelInfo::new("google/gemini-pro-1.5", "Gemini Pro 1.5 (via OpenRouter)", 2_000_000),
            ModelInfo::new("deepseek/deepseek-chat", "DeepSeek Chat (via OpenRouter)", 64_000),
            ModelInfo::new("meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B (via OpenRouter)", 128_000),
            ModelInfo::new("mistralai/mistral-large-2411", "Mistral Large (via OpenRouter)", 128_000),
        ]
    }

    fn supports_model(&self, model: &str) -> bool {
        // OpenRouter uses vendor/model format
        model.contains('/')
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = build_chat_body(&request, false);
        let response = self.post(&body).await?;
        let text = response.text().await.map_err(transport_error)?;
        Ok(parse_chat_response(&text, &request.model)?)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let body = build_chat_body(&request, true);
        let response = self.post(&body).await?;
        Ok(line_stream(response, ChatSseDecoder::default()))
    }
}
