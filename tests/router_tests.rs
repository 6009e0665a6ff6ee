// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Router behaviour under failure, retry and cancellation.
//!
//! All tests run on a paused clock so backoff and timeouts complete instantly.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use nexus::error::{ApiError, NexusError};
use nexus::llm::message::ChatMessage;
use nexus::llm::mock_provider::{MockProvider, MockReply};
use nexus::llm::provider::{CompletionRequest, ProviderKind};
use nexus::llm::retry::RetryConfig;
use nexus::llm::router::{ProviderRouter, RouterEvent};
use nexus::Result;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(30);

fn retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay_ms: 100,
        max_delay_ms: 1000,
        jitter: 0.0,
    }
}

fn router_with(mock: &MockProvider, max_retries: u32) -> ProviderRouter {
    ProviderRouter::new(ProviderKind::OpenAi, retry(max_retries), TIMEOUT)
        .with_provider(Arc::new(mock.clone()))
        .with_default_model(ProviderKind::OpenAi, "gpt-4o")
}

fn request() -> CompletionRequest {
    CompletionRequest::new("gpt-4o", vec![ChatMessage::user("hi")])
}

async fn run(router: &ProviderRouter, cancel: CancellationToken) -> Vec<Result<RouterEvent>> {
    router.stream(request(), cancel).collect().await
}

fn unavailable() -> ApiError {
    ApiError::ProviderUnavailable("HTTP 503: down".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_retries_transient_failure_then_succeeds() {
    let mock = MockProvider::new(ProviderKind::OpenAi).with_replies(vec![
        MockReply::Fail(unavailable()),
        MockReply::Fail(ApiError::Timeout),
        MockReply::text(["fine ", "now"]),
    ]);
    let router = router_with(&mock, 3);

    let events = run(&router, CancellationToken::new()).await;
    assert_eq!(mock.call_count(), 3);

    // No output reached the caller before the failures, so no restart marker
    assert!(events
        .iter()
        .all(|e| !matches!(e, Ok(RouterEvent::Restarted { .. }))));

    match events.last() {
        Some(Ok(RouterEvent::Completed(completion))) => {
            assert_eq!(completion.text, "fine now");
            assert_eq!(completion.attempts, 3);
            assert_eq!(completion.provider, ProviderKind::OpenAi);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_overrides_backoff() {
    let mock = MockProvider::new(ProviderKind::OpenAi).with_replies(vec![
        MockReply::Fail(ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        }),
        MockReply::text(["ok"]),
    ]);
    let router = router_with(&mock, 2);

    let started = Instant::now();
    let events = run(&router, CancellationToken::new()).await;
    let waited = started.elapsed();

    assert_eq!(mock.call_count(), 2);
    match events.last() {
        Some(Ok(RouterEvent::Completed(completion))) => assert_eq!(completion.attempts, 2),
        other => panic!("expected completion, got {:?}", other),
    }
    // Backoff alone would have been 100ms
    assert!(waited >= Duration::from_secs(2), "waited only {:?}", waited);
    assert!(waited < Duration::from_secs(3), "waited {:?}", waited);
}

#[tokio::test(start_paused = true)]
async fn test_restart_marker_after_partial_output() {
    let mock = MockProvider::new(ProviderKind::OpenAi).with_replies(vec![
        MockReply::FailAfter {
            chunks: vec!["Once upon".to_string()],
            error: unavailable(),
        },
        MockReply::text(["A fresh ", "start"]),
    ]);
    let router = router_with(&mock, 3);

    let events: Vec<RouterEvent> = run(&router, CancellationToken::new())
        .await
        .into_iter()
        .map(|e| e.unwrap())
        .collect();

    assert_eq!(events[0], RouterEvent::Delta("Once upon".to_string()));
    assert!(matches!(events[1], RouterEvent::Restarted { attempt: 1, .. }));
    assert_eq!(events[2], RouterEvent::Delta("A fresh ".to_string()));
    match events.last() {
        // Only the surviving attempt's text is reported
        Some(RouterEvent::Completed(completion)) => assert_eq!(completion.text, "A fresh start"),
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_is_not_retried() {
    let mock = MockProvider::new(ProviderKind::OpenAi)
        .with_replies(vec![MockReply::Fail(ApiError::AuthError("bad key".to_string()))]);
    let router = router_with(&mock, 5);

    let events = run(&router, CancellationToken::new()).await;
    assert_eq!(mock.call_count(), 1);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Err(NexusError::Api(ApiError::AuthError(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_last_error() {
    let mock =
        MockProvider::new(ProviderKind::OpenAi).with_replies(vec![MockReply::Fail(unavailable())]);
    let router = router_with(&mock, 2);

    let events = run(&router, CancellationToken::new()).await;
    assert_eq!(mock.call_count(), 3);
    assert!(matches!(
        events.last(),
        Some(Err(NexusError::Api(ApiError::ProviderUnavailable(_))))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
    let mock = MockProvider::new(ProviderKind::OpenAi).with_replies(vec![MockReply::Hang]);
    let router = router_with(&mock, 1);

    let events = run(&router, CancellationToken::new()).await;
    assert_eq!(mock.call_count(), 2);
    assert!(matches!(
        events.last(),
        Some(Err(NexusError::Api(ApiError::Timeout)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_stream_times_out_between_chunks() {
    let mock = MockProvider::new(ProviderKind::OpenAi).with_replies(vec![
        MockReply::StallAfter(vec!["half".to_string()]),
        MockReply::text(["whole"]),
    ]);
    let router = router_with(&mock, 1);

    let events = run(&router, CancellationToken::new()).await;
    assert_eq!(mock.call_count(), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        Ok(RouterEvent::Restarted { reason, .. }) if reason == "Request timed out"
    )));
    assert!(matches!(events.last(), Some(Ok(RouterEvent::Completed(_)))));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_stream_ends_without_completion() {
    let mock = MockProvider::new(ProviderKind::OpenAi)
        .with_replies(vec![MockReply::StallAfter(vec!["partial".to_string()])]);
    let router = router_with(&mock, 3);
    let cancel = CancellationToken::new();

    let mut stream = router.stream(request(), cancel.clone());
    let first = stream.next().await;
    assert!(matches!(first, Some(Ok(RouterEvent::Delta(_)))));

    cancel.cancel();
    let rest: Vec<_> = stream.collect().await;
    assert!(rest.is_empty(), "unexpected events after cancel: {:?}", rest);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_retrying() {
    let mock = MockProvider::new(ProviderKind::OpenAi).with_replies(vec![MockReply::Fail(
        ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        },
    )]);
    let router = router_with(&mock, 3);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let events = run(&router, cancel).await;
    assert!(events.is_empty());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_model_falls_back_to_default_provider() {
    let openai = MockProvider::new(ProviderKind::OpenAi).with_models(&["gpt-4o"]);
    let anthropic = MockProvider::new(ProviderKind::Anthropic).with_models(&["claude-sonnet-4"]);
    let router = ProviderRouter::new(ProviderKind::Anthropic, retry(0), TIMEOUT)
        .with_provider(Arc::new(openai.clone()))
        .with_provider(Arc::new(anthropic.clone()));

    let request = CompletionRequest::new("some-new-model", vec![ChatMessage::user("hi")]);
    let events: Vec<_> = router.stream(request, CancellationToken::new()).collect().await;

    assert!(matches!(events.last(), Some(Ok(RouterEvent::Completed(_)))));
    assert_eq!(openai.call_count(), 0);
    assert_eq!(anthropic.call_count(), 1);
    assert_eq!(anthropic.last_request().unwrap().model, "some-new-model");
}
