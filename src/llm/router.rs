// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider routing
//!
//! Picks the provider for a request, drives it through the per-request
//! state machine and retries transient failures. Callers consume a single
//! stream of [`RouterEvent`]s regardless of how many attempts were needed.

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::{ApiError, NexusError, Result};
use crate::llm::provider::{
    CompletionRequest, LlmProvider, ModelInfo, ProviderKind, ResponseChunk, Usage,
};
use crate::llm::providers::ProviderClient;
use crate::llm::retry::RetryConfig;

const LOG_TARGET: &str = "nexus.llm.router";

/// Lifecycle of one routed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Dispatching,
    Streaming,
    Completed,
    Failed,
}

impl RequestState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Idle, Dispatching)
                | (Dispatching, Streaming)
                | (Dispatching, Dispatching)
                | (Dispatching, Failed)
                | (Streaming, Dispatching)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }

    /// Completed and Failed accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Idle => "idle",
            RequestState::Dispatching => "dispatching",
            RequestState::Streaming => "streaming",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final result of a routed request
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Text of the successful attempt only
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    pub provider: ProviderKind,
    pub model: String,
    /// Number of attempts made, including the successful one
    pub attempts: u32,
}

/// Items of a routed response stream
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    /// Next piece of generated text
    Delta(String),
    /// Output already forwarded is void; a fresh attempt follows
    Restarted { attempt: u32, reason: String },
    /// Generation finished
    Completed(Completion),
}

/// Stream returned by [`ProviderRouter::stream`]
pub type RouterStream = Pin<Box<dyn Stream<Item = Result<RouterEvent>> + Send>>;

/// Routes requests to registered providers with retry and cancellation
#[derive(Clone)]
pub struct ProviderRouter {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
    default_models: HashMap<ProviderKind, String>,
    default_provider: ProviderKind,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl ProviderRouter {
    /// Create an empty router
    pub fn new(default_provider: ProviderKind, retry: RetryConfig, request_timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            default_models: HashMap::new(),
            default_provider,
            retry,
            request_timeout,
        }
    }

    /// Register every provider that settings enable and can authenticate
    pub fn from_settings(settings: &Settings) -> Self {
        let mut router = Self::new(
            settings.defaults.provider,
            RetryConfig::from(&settings.resilience),
            settings.request_timeout(),
        );

        for kind in ProviderKind::ALL {
            let config = settings.providers.get(kind);
            if !config.default_model.is_empty() {
                router
                    .default_models
                    .insert(kind, config.default_model.clone());
            }
            if !settings.is_provider_configured(kind) {
                tracing::debug!(target: LOG_TARGET, provider = %kind, "provider not configured, skipping");
                continue;
            }
            match ProviderClient::from_settings(kind, settings) {
                Ok(client) => router.register(Arc::new(client)),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, provider = %kind, error = %e, "failed to initialize provider")
                }
            }
        }
        router
    }

    /// Register a provider under its own kind, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        tracing::debug!(target: LOG_TARGET, provider = %provider.kind(), "registered provider");
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Model used when a request names none
    pub fn with_default_model(mut self, kind: ProviderKind, model: impl Into<String>) -> Self {
        self.default_models.insert(kind, model.into());
        self
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    pub fn default_model(&self, kind: ProviderKind) -> Option<&str> {
        self.default_models.get(&kind).map(String::as_str)
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Registered provider kinds in resolution order
    pub fn registered(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }

    /// Known models of every registered provider
    pub fn available_models(&self) -> Vec<(ProviderKind, ModelInfo)> {
        self.registered()
            .into_iter()
            .filter_map(|kind| self.providers.get(&kind).map(|p| (kind, p)))
            .flat_map(|(kind, provider)| {
                provider
                    .available_models()
                    .into_iter()
                    .map(move |model| (kind, model))
            })
            .collect()
    }

    /// Pick the provider and the model id it should receive.
    ///
    /// Order: explicit provider, then a `provider/model` prefix naming a
    /// registered provider, then the first provider claiming the model,
    /// then the default provider.
    pub fn resolve(&self, request: &CompletionRequest) -> Result<(Arc<dyn LlmProvider>, String)> {
        let model = request.model.trim();

        if let Some(kind) = request.provider {
            let provider = self.lookup(kind)?;
            return Ok((provider, self.model_or_default(kind, model)?));
        }

        if model.is_empty() {
            let kind = self.default_provider;
            return Ok((self.lookup(kind)?, self.model_or_default(kind, model)?));
        }

        if let Some((prefix, rest)) = model.split_once('/') {
            if let Ok(kind) = prefix.parse::<ProviderKind>() {
                if let Some(provider) = self.providers.get(&kind) {
                    if !rest.is_empty() {
                        return Ok((provider.clone(), rest.to_string()));
                    }
                }
            }
        }

        for kind in ProviderKind::ALL {
            if let Some(provider) = self.providers.get(&kind) {
                if provider.supports_model(model) {
                    return Ok((provider.clone(), model.to_string()));
                }
            }
        }

        Ok((self.lookup(self.default_provider)?, model.to_string()))
    }

    fn lookup(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            NexusError::Config(format!(
                "provider '{}' is not configured (enable it and set its API key)",
                kind
            ))
        })
    }

    fn model_or_default(&self, kind: ProviderKind, model: &str) -> Result<String> {
        if !model.is_empty() {
            return Ok(model.to_string());
        }
        self.default_models
            .get(&kind)
            .cloned()
            .ok_or_else(|| NexusError::InvalidInput(format!("no model given and '{}' has no default model", kind)))
    }

    /// Route `request` and stream the outcome.
    ///
    /// The stream ends after `Completed` or after a single `Err`. When
    /// `cancel` fires the in-flight provider stream is dropped and the
    /// output ends with neither.
    pub fn stream(&self, request: CompletionRequest, cancel: CancellationToken) -> RouterStream {
        let resolved = self.resolve(&request);
        let retry = self.retry.clone();
        let call_timeout = self.request_timeout;

        Box::pin(async_stream::stream! {
            let (provider, model) = match resolved {
                Ok(resolved) => resolved,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let kind = provider.kind();
            let mut request = request;
            request.model = model.clone();
            request.provider = Some(kind);

            let mut state = RequestState::Idle;
            let mut attempt: u32 = 0;

            loop {
                transition(&mut state, RequestState::Dispatching, kind, attempt);
                let mut partial = false;

                let connect = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(target: LOG_TARGET, provider = %kind, state = %state, "request cancelled");
                        return;
                    }
                    result = tokio::time::timeout(call_timeout, provider.send(request.clone())) => result,
                };

                let failure = match connect {
                    Err(_) => ApiError::Timeout,
                    Ok(Err(NexusError::Api(e))) => e,
                    Ok(Err(other)) => {
                        transition(&mut state, RequestState::Failed, kind, attempt);
                        yield Err(other);
                        return;
                    }
                    Ok(Ok(mut chunks)) => {
                        transition(&mut state, RequestState::Streaming, kind, attempt);
                        let mut text = String::new();
                        loop {
                            let next = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => {
                                    tracing::debug!(target: LOG_TARGET, provider = %kind, state = %state, "request cancelled");
                                    return;
                                }
                                next = tokio::time::timeout(call_timeout, chunks.next()) => next,
                            };
                            match next {
                                Err(_) => break ApiError::Timeout,
                                Ok(None) => {
                                    break ApiError::ProviderUnavailable(
                                        "stream ended before completion".to_string(),
                                    )
                                }
                                Ok(Some(ResponseChunk::Delta(delta))) => {
                                    partial = true;
                                    text.push_str(&delta);
                                    yield Ok(RouterEvent::Delta(delta));
                                }
                                Ok(Some(ResponseChunk::Done { usage, finish_reason })) => {
                                    transition(&mut state, RequestState::Completed, kind, attempt);
                                    yield Ok(RouterEvent::Completed(Completion {
                                        text,
                                        usage,
                                        finish_reason,
                                        provider: kind,
                                        model: model.clone(),
                                        attempts: attempt + 1,
                                    }));
                                    return;
                                }
                                Ok(Some(ResponseChunk::Error(e))) => break e,
                            }
                        }
                    }
                };

                if !failure.is_transient() || attempt >= retry.max_retries {
                    tracing::warn!(
                        target: LOG_TARGET,
                        provider = %kind,
                        attempt = attempt + 1,
                        error = %failure,
                        "request failed"
                    );
                    transition(&mut state, RequestState::Failed, kind, attempt);
                    yield Err(failure.into());
                    return;
                }

                let delay = retry.delay_for(&failure, attempt);
                attempt += 1;
                tracing::warn!(
                    target: LOG_TARGET,
                    provider = %kind,
                    attempt,
                    max_retries = retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "transient provider error, retrying"
                );
                if partial {
                    yield Ok(RouterEvent::Restarted {
                        attempt,
                        reason: failure.to_string(),
                    });
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(target: LOG_TARGET, provider = %kind, "request cancelled during backoff");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        })
    }
}

fn transition(state: &mut RequestState, next: RequestState, provider: ProviderKind, attempt: u32) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal request transition {} -> {}",
        state,
        next
    );
    tracing::debug!(
        target: LOG_TARGET,
        provider = %provider,
        attempt = attempt + 1,
        from = %state,
        to = %next,
        "request state"
    );
    *state = next;
}
