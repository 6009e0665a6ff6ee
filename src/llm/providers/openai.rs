// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI chat completions provider
//!
//! The wire types here are shared with OpenRouter, which speaks the same
//! request and SSE format.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::common::{
    excerpt, line_stream, parse_retry_after, sse_data, status_error, transport_error, LineDecoder,
};
use crate::error::{ApiError, Result};
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, ProviderKind,
    ResponseChunk, Usage,
};

const MODEL_PREFIXES: &[&str] = &["gpt-", "o1", "o3", "o4", "chatgpt-"];

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, ProviderKind::OpenAi.default_base_url())
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
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo::new("gpt-4o", "GPT-4o", 128_000),
            ModelInfo::new("gpt-4o-mini", "GPT-4o Mini", 128_000),
            ModelInfo::new("gpt-4-turbo", "GPT-4 Turbo", 128_000),
            ModelInfo::new("gpt-4", "GPT-4", 8_192),
            ModelInfo::new("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385),
            ModelInfo::new("o1", "OpenAI o1", 200_000),
            ModelInfo::new("o1-mini", "OpenAI o1-mini", 128_000),
        ]
    }

    fn supports_model(&self, model: &str) -> bool {
        !model.contains('/') && MODEL_PREFIXES.iter().any(|p| model.starts_with(p))
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

// OpenAI-compatible wire types

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Build the request body. The system prompt goes first as a `system` message.
pub(crate) fn build_chat_body(request: &CompletionRequest, stream: bool) -> ChatCompletionBody<'_> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system.as_deref() {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(request.messages.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));

    ChatCompletionBody {
        model: &request.model,
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
    /// A string for OpenAI, a number for OpenRouter
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl WireError {
    fn code_str(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn numeric_code(&self) -> Option<u16> {
        self.code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
    }
}

/// Parse a non-streaming chat completion body.
pub(crate) fn parse_chat_response(
    body: &str,
    requested_model: &str,
) -> std::result::Result<CompletionResponse, ApiError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| ApiError::Unknown(format!("malformed completion: {}", e)))?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Unknown("no choices in response".to_string()))?;

    Ok(CompletionResponse {
        model: completion
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        content: choice.message.content.unwrap_or_default(),
        usage: completion.usage.map(Usage::from),
        finish_reason: choice.finish_reason,
    })
}

/// Map an OpenAI-style error response.
pub(crate) fn parse_error(
    status: u16,
    body: &str,
    retry_after: Option<std::time::Duration>,
) -> ApiError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return status_error(status, excerpt(body), retry_after);
    };
    let message = envelope.error.message.clone();

    match envelope.error.code_str().as_deref() {
        Some("invalid_api_key") => ApiError::AuthError(message),
        Some("insufficient_quota") => ApiError::InvalidRequest(format!("quota exceeded: {}", message)),
        Some("rate_limit_exceeded") => ApiError::RateLimited { retry_after },
        Some("context_length_exceeded") | Some("model_not_found") => {
            ApiError::InvalidRequest(message)
        }
        _ => status_error(status, message, retry_after),
    }
}

/// SSE decoder for `chat.completion.chunk` events
#[derive(Debug, Default)]
pub(crate) struct ChatSseDecoder {
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl LineDecoder for ChatSseDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<ResponseChunk> {
        let Some(data) = sse_data(line) else {
            return Vec::new();
        };

        if data == "[DONE]" {
            return vec![ResponseChunk::Done {
                usage: self.usage.take(),
                finish_reason: self.finish_reason.take(),
            }];
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(target: "nexus.llm.providers", error = %e, "skipping unparseable SSE data");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            let status = error.numeric_code().unwrap_or(500);
            return vec![ResponseChunk::Error(status_error(status, error.message, None))];
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(ResponseChunk::Delta(text));
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        out
    }
}
