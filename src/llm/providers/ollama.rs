// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Ollama local LLM provider
//!
//! Talks to `/api/chat`, which streams newline-delimited JSON.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::common::{excerpt, line_stream, status_error, transport_error, LineDecoder};
use crate::error::{ApiError, Result};
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, ProviderKind,
    ResponseChunk, Usage,
};

const NOT_RUNNING: &str = "Ollama is not running. Start the Ollama app or run 'ollama serve'";

const MODEL_FAMILIES: &[&str] = &[
    "llama", "mistral", "mixtral", "qwen", "gemma", "phi", "codellama", "deepseek", "tinyllama",
];

/// Ollama provider for local models
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default base URL (http://localhost:11434)
    pub fn new() -> Self {
        Self::with_base_url(ProviderKind::Ollama.default_base_url())
    }

    /// Create with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// List models pulled into the local Ollama install
    pub async fn list_local_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body).into());
        }

        let text = response.text().await.map_err(transport_error)?;
        let tags: OllamaTagsResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::Unknown(format!("malformed tag list: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn build_request<'a>(&self, request: &'a CompletionRequest, stream: bool) -> OllamaRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system.as_deref() {
            messages.push(OllamaMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        OllamaRequest {
            model: &request.model,
            messages,
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn post(&self, body: &OllamaRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(body)
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body).into());
        }
        Ok(response)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn connection_error(err: reqwest::Error) -> ApiError {
    if err.is_connect() {
        ApiError::ProviderUnavailable(NOT_RUNNING.to_string())
    } else {
        transport_error(err)
    }
}

/// Map an Ollama error body (`{"error": "..."}`).
pub(crate) fn parse_error(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<OllamaError>(body) {
        Ok(error_response) => {
            let message = error_response.error;
            if message.contains("model") && message.contains("not found") {
                ApiError::InvalidRequest(message)
            } else {
                status_error(status, message, None)
            }
        }
        Err(_) => status_error(status, excerpt(body), None),
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo::new("llama3.2:latest", "Llama 3.2", 128_000),
            ModelInfo::new("llama3.1:8b", "Llama 3.1 8B", 128_000),
            ModelInfo::new("qwen2.5-coder:7b", "Qwen 2.5 Coder 7B", 32_768),
            ModelInfo::new("mistral:latest", "Mistral 7B", 32_768),
            ModelInfo::new("gemma2:9b", "Gemma 2 9B", 8_192),
        ]
    }

    fn supports_model(&self, model: &str) -> bool {
        !model.contains('/') && MODEL_FAMILIES.iter().any(|f| model.starts_with(f))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        let response = self.post(&body).await?;
        let text = response.text().await.map_err(transport_error)?;

        let chunk: OllamaChatChunk = serde_json::from_str(&text)
            .map_err(|e| ApiError::Unknown(format!("malformed chat response: {}", e)))?;
        let usage = chunk.usage();
        if let Some(error) = chunk.error {
            return Err(ApiError::ProviderUnavailable(error).into());
        }

        Ok(CompletionResponse {
            model: chunk.model.unwrap_or(request.model),
            content: chunk.message.map(|m| m.content).unwrap_or_default(),
            usage,
            finish_reason: chunk.done_reason,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let body = self.build_request(&request, true);
        let response = self.post(&body).await?;
        Ok(line_stream(response, NdjsonDecoder))
    }
}

/// NDJSON decoder: one chat chunk per line, the last one has `done: true`
struct NdjsonDecoder;

impl LineDecoder for NdjsonDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<ResponseChunk> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let chunk: OllamaChatChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(target: "nexus.llm.providers", error = %e, "skipping unparseable NDJSON line");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error.clone() {
            return vec![ResponseChunk::Error(ApiError::ProviderUnavailable(error))];
        }

        let mut out = Vec::new();
        if let Some(text) = chunk.message.as_ref().map(|m| m.content.as_str()) {
            if !text.is_empty() {
                out.push(ResponseChunk::Delta(text.to_string()));
            }
        }
        if chunk.done {
            out.push(ResponseChunk::Done {
                usage: chunk.usage(),
                finish_reason: chunk.done_reason.clone(),
            });
        }
        out
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaChatChunk {
    fn usage(&self) -> Option<Usage> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(Usage::new(prompt.unwrap_or(0), completion.unwrap_or(0))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}
