// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic Claude API provider implementation
//!
//! Implements the LlmProvider trait for Claude models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::common::{
    excerpt, line_stream, parse_retry_after, sse_data, status_error, transport_error, LineDecoder,
};
use crate::error::{ApiError, Result};
use crate::llm::message::Role;
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, ProviderKind,
    ResponseChunk, Usage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, ProviderKind::Anthropic.default_base_url())
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
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    /// Build the messages body. System turns are folded into the top-level
    /// `system` field since the API rejects them inside `messages`.
    fn build_request<'a>(&self, request: &'a CompletionRequest, stream: bool) -> AnthropicRequest<'a> {
        let mut system_parts: Vec<&str> = request.system.as_deref().into_iter().collect();
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(&message.content),
                Role::User | Role::Assistant => messages.push(AnthropicMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                }),
            }
        }

        AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            messages,
            stream,
        }
    }

    async fn post(&self, body: &AnthropicRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            // Extract Retry-After header before consuming response body
            let status = response.status().as_u16();
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, retry_after).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo::new("claude-opus-4-5-20251101", "Claude Opus 4.5", 200_000),
            ModelInfo::new("claude-sonnet-4-5-20250929", "Claude Sonnet 4.5", 200_000),
            ModelInfo::new("claude-haiku-4-5-20251001", "Claude Haiku 4.5", 200_000),
            ModelInfo::new("claude-opus-4-1-20250805", "Claude Opus 4.1", 200_000),
            ModelInfo::new("claude-sonnet-4-20250514", "Claude Sonnet 4", 200_000),
            ModelInfo::new("claude-3-7-sonnet-20250219", "Claude 3.7 Sonnet", 200_000),
            ModelInfo::new("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", 200_000),
        ]
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("claude-")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        let response = self.post(&body).await?;
        let text = response.text().await.map_err(transport_error)?;

        let api_response: AnthropicResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::Unknown(format!("malformed message: {}", e)))?;

        let content = api_response
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            model: api_response.model.unwrap_or(request.model),
            content,
            usage: api_response
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
            finish_reason: api_response.stop_reason,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let body = self.build_request(&request, true);
        let response = self.post(&body).await?;
        Ok(line_stream(response, MessageSseDecoder::default()))
    }
}

/// Map an Anthropic error response.
pub(crate) fn parse_error(status: u16, body: &str, retry_after: Option<Duration>) -> ApiError {
    match serde_json::from_str::<AnthropicError>(body) {
        Ok(error_response) => error_from_type(
            status,
            &error_response.error.error_type,
            error_response.error.message,
            retry_after,
        ),
        Err(_) => status_error(status, excerpt(body), retry_after),
    }
}

fn error_from_type(
    status: u16,
    error_type: &str,
    message: String,
    retry_after: Option<Duration>,
) -> ApiError {
    match error_type {
        "authentication_error" | "permission_error" => ApiError::AuthError(message),
        "rate_limit_error" => ApiError::RateLimited { retry_after },
        "overloaded_error" | "api_error" => ApiError::ProviderUnavailable(message),
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            ApiError::InvalidRequest(message)
        }
        _ => status_error(status, message, retry_after),
    }
}

/// SSE decoder for the messages streaming protocol
#[derive(Debug, Default)]
struct MessageSseDecoder {
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<String>,
}

impl LineDecoder for MessageSseDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<ResponseChunk> {
        // `event:` lines repeat the `type` field of the data payload
        let Some(data) = sse_data(line) else {
            return Vec::new();
        };
        let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
            tracing::debug!(target: "nexus.llm.providers", "skipping unparseable SSE data");
            return Vec::new();
        };

        match event["type"].as_str().unwrap_or_default() {
            "message_start" => {
                let usage = &event["message"]["usage"];
                self.input_tokens = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
                self.output_tokens = usage["output_tokens"].as_u64().unwrap_or(0) as u32;
                Vec::new()
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match (delta["type"].as_str(), delta["text"].as_str()) {
                    (Some("text_delta"), Some(text)) if !text.is_empty() => {
                        vec![ResponseChunk::Delta(text.to_string())]
                    }
                    _ => Vec::new(),
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = output as u32;
                }
                Vec::new()
            }
            "message_stop" => vec![ResponseChunk::Done {
                usage: Some(Usage::new(self.input_tokens, self.output_tokens)),
                finish_reason: self.stop_reason.take(),
            }],
            "error" => {
                let error = &event["error"];
                let error_type = error["type"].as_str().unwrap_or("api_error");
                let message = error["message"].as_str().unwrap_or_default().to_string();
                vec![ResponseChunk::Error(error_from_type(
                    500, error_type, message, None,
                ))]
            }
            _ => Vec::new(),
        }
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}
