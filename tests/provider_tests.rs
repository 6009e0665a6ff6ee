// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use futures::StreamExt;
use nexus::error::{ApiError, NexusError};
use nexus::llm::message::ChatMessage;
use nexus::llm::provider::{CompletionRequest, LlmProvider, ResponseChunk, Usage};
use nexus::llm::providers::{AnthropicProvider, OllamaProvider, OpenAiProvider, OpenRouterProvider};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(model: &str) -> CompletionRequest {
    CompletionRequest::new(model, vec![ChatMessage::user("Hello")])
}

fn api_error<T>(result: nexus::Result<T>) -> ApiError {
    match result {
        Err(NexusError::Api(e)) => e,
        Err(other) => panic!("expected API error, got {:?}", other),
        Ok(_) => panic!("expected API error, got success"),
    }
}

async fn collect(provider: &dyn LlmProvider, request: CompletionRequest) -> Vec<ResponseChunk> {
    provider.send(request).await.unwrap().collect().await
}

fn text_of(chunks: &[ResponseChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| match c {
            ResponseChunk::Delta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

// ===== OpenAI-like =====

#[tokio::test]
async fn test_openai_streaming() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({"stream": true, "model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url("sk-test", server.uri());
    let chunks = collect(&provider, request("gpt-4o")).await;

    assert_eq!(text_of(&chunks), "Hello");
    assert_eq!(
        chunks.last(),
        Some(&ResponseChunk::Done {
            usage: Some(Usage::new(7, 2)),
            finish_reason: Some("stop".to_string()),
        })
    );
}

#[tokio::test]
async fn test_openai_non_streaming_yields_single_delta() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "Hi!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url("sk-test", server.uri());
    let chunks = collect(&provider, request("gpt-4o").with_stream(false)).await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], ResponseChunk::Delta("Hi!".to_string()));

    let response = provider.complete(request("gpt-4o")).await.unwrap();
    assert_eq!(response.model, "gpt-4o-2024-08-06");
    assert_eq!(response.usage, Some(Usage::new(3, 1)));
}

#[tokio::test]
async fn test_openai_status_mapping() {
    let cases: Vec<(u16, serde_json::Value, fn(&ApiError) -> bool)> = vec![
        (
            401,
            serde_json::json!({"error": {"message": "Incorrect API key", "code": "invalid_api_key"}}),
            |e| matches!(e, ApiError::AuthError(_)),
        ),
        (
            400,
            serde_json::json!({"error": {"message": "too long", "code": "context_length_exceeded"}}),
            |e| matches!(e, ApiError::InvalidRequest(_)),
        ),
        (
            503,
            serde_json::json!({"error": {"message": "overloaded"}}),
            |e| matches!(e, ApiError::ProviderUnavailable(_)),
        ),
    ];

    for (status, body, check) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        let provider = OpenAiProvider::with_base_url("sk-test", server.uri());
        let error = api_error(provider.complete(request("gpt-4o")).await);
        assert!(check(&error), "status {} mapped to {:?}", status, error);
    }
}

#[tokio::test]
async fn test_openai_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_json(serde_json::json!({"error": {"message": "slow down", "code": "rate_limit_exceeded"}})),
        )
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url("sk-test", server.uri());
    let error = api_error(provider.complete_stream(request("gpt-4o")).await);
    assert_eq!(
        error,
        ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(2))
        }
    );
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_stream_truncated_before_done() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url("sk-test", server.uri());
    let chunks = collect(&provider, request("gpt-4o")).await;
    assert_eq!(chunks[0], ResponseChunk::Delta("partial".to_string()));
    assert!(matches!(
        chunks.last(),
        Some(ResponseChunk::Error(ApiError::ProviderUnavailable(_)))
    ));
}

#[tokio::test]
async fn test_connection_refused_is_unavailable() {
    // Nothing listens on port 9 of localhost in the test environment
    let provider = OpenAiProvider::with_base_url("sk-test", "http://127.0.0.1:9");
    let error = api_error(provider.complete(request("gpt-4o")).await);
    assert!(error.is_transient(), "got {:?}", error);
}

// ===== OpenRouter-like =====

#[tokio::test]
async fn test_openrouter_sends_attribution_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer or-key"))
        .and(header("x-title", "Nexus AI CLI"))
        .and(header("http-referer", "https://github.com/nexus-ai/nexus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "routed"}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenRouterProvider::with_base_url("or-key", server.uri());
    let response = provider
        .complete(request("meta-llama/llama-3.3-70b-instruct"))
        .await
        .unwrap();
    assert_eq!(response.content, "routed");
    assert_eq!(response.model, "meta-llama/llama-3.3-70b-instruct");
}

// ===== Anthropic-like =====

#[tokio::test]
async fn test_anthropic_streaming() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":10,\"output_tokens\":1}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bonjour\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":3}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::with_base_url("ak-test", server.uri());
    let chunks = collect(&provider, request("claude-sonnet-4-20250514")).await;

    assert_eq!(text_of(&chunks), "Bonjour");
    assert_eq!(
        chunks.last(),
        Some(&ResponseChunk::Done {
            usage: Some(Usage::new(10, 3)),
            finish_reason: Some("end_turn".to_string()),
        })
    );
}

#[tokio::test]
async fn test_anthropic_error_body_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::with_base_url("ak-test", server.uri());
    let error = api_error(provider.complete(request("claude-sonnet-4-20250514")).await);
    assert!(matches!(error, ApiError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_anthropic_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::with_base_url("bad", server.uri());
    let error = api_error(provider.complete_stream(request("claude-sonnet-4-20250514")).await);
    assert!(matches!(error, ApiError::AuthError(_)));
    assert!(!error.is_transient());
}

// ===== Ollama-like =====

#[tokio::test]
async fn test_ollama_ndjson_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
        "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\" there\"},\"done\":false}\n",
        "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":8,\"eval_count\":2}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::with_base_url(server.uri());
    let chunks = collect(&provider, request("llama3.2")).await;
    assert_eq!(text_of(&chunks), "Hi there");
    assert_eq!(
        chunks.last(),
        Some(&ResponseChunk::Done {
            usage: Some(Usage::new(8, 2)),
            finish_reason: Some("stop".to_string()),
        })
    );
}

#[tokio::test]
async fn test_ollama_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"error": "model 'nope' not found, try pulling it first"})),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::with_base_url(server.uri());
    let error = api_error(provider.complete(request("nope")).await);
    assert!(matches!(error, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_ollama_lists_local_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [{"name": "llama3.2:latest"}, {"name": "qwen2.5-coder:7b"}]
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::with_base_url(server.uri());
    let models = provider.list_local_models().await.unwrap();
    assert_eq!(models, vec!["llama3.2:latest", "qwen2.5-coder:7b"]);
}
