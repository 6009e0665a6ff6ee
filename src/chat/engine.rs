// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Reusable chat exchange loop.
//!
//! Runs one prompt against a session: builds the request from the stored
//! history, forwards router output to the caller and, once the provider
//! has finished, appends the user and assistant messages in one commit.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DefaultsConfig;
use crate::error::{NexusError, Result};
use crate::llm::message::ChatMessage;
use crate::llm::provider::{CompletionRequest, ProviderKind};
use crate::llm::router::{Completion, ProviderRouter, RouterEvent};
use crate::session::{Message, Session, SessionStore};

const LOG_TARGET: &str = "nexus.chat.engine";

/// One prompt to run
#[derive(Debug, Clone, Default)]
pub struct ExchangeRequest {
    /// Session to continue; a temporary session is used when absent
    pub session: Option<String>,
    pub prompt: String,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    /// Overrides the session's stored system prompt for this exchange
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
}

impl ExchangeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn in_session(mut self, name: impl Into<String>) -> Self {
        self.session = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Output of [`ChatEngine::send`]
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    Delta(String),
    Restarted { attempt: u32, reason: String },
    Completed(Completion),
    /// The exchange is durably stored
    Saved(Session),
}

pub type ExchangeStream = Pin<Box<dyn Stream<Item = Result<ExchangeEvent>> + Send>>;

/// Drives exchanges between the store and the router
#[derive(Clone)]
pub struct ChatEngine {
    store: Arc<SessionStore>,
    router: Arc<ProviderRouter>,
    defaults: DefaultsConfig,
}

impl ChatEngine {
    pub fn new(store: Arc<SessionStore>, router: Arc<ProviderRouter>, defaults: DefaultsConfig) -> Self {
        Self {
            store,
            router,
            defaults,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Run `request`. Nothing is persisted unless the provider completes
    /// with a non-empty answer; `Saved` is yielded only after the commit.
    pub fn send(&self, request: ExchangeRequest, cancel: CancellationToken) -> ExchangeStream {
        let engine = self.clone();

        Box::pin(async_stream::stream! {
            if request.prompt.trim().is_empty() {
                yield Err(NexusError::InvalidInput("prompt must not be empty".to_string()));
                return;
            }

            let existing = match &request.session {
                Some(name) => match engine.store.open(name).await {
                    Ok(session) => Some(session),
                    Err(NexusError::SessionNotFound(_)) => None,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                },
                None => None,
            };

            let completion_request = match engine.build_request(&request, existing.as_ref()) {
                Ok(built) => built,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            tracing::debug!(
                target: LOG_TARGET,
                session = ?request.session,
                model = %completion_request.model,
                history = completion_request.messages.len() - 1,
                "sending exchange"
            );

            let user_message = Message::user(request.prompt.clone());
            let started = Instant::now();
            let mut events = engine.router.stream(completion_request, cancel.clone());
            let mut completion = None;

            while let Some(event) = events.next().await {
                match event {
                    Ok(RouterEvent::Delta(text)) => yield Ok(ExchangeEvent::Delta(text)),
                    Ok(RouterEvent::Restarted { attempt, reason }) => {
                        yield Ok(ExchangeEvent::Restarted { attempt, reason })
                    }
                    Ok(RouterEvent::Completed(done)) => {
                        completion = Some(done.clone());
                        yield Ok(ExchangeEvent::Completed(done));
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            let Some(completion) = completion else {
                if cancel.is_cancelled() {
                    tracing::debug!(target: LOG_TARGET, "exchange cancelled, nothing saved");
                    yield Err(NexusError::Cancelled);
                }
                return;
            };

            if completion.text.trim().is_empty() {
                tracing::warn!(
                    target: LOG_TARGET,
                    provider = %completion.provider,
                    model = %completion.model,
                    "provider returned an empty response, nothing saved"
                );
                return;
            }

            let mut assistant = Message::assistant(completion.text.clone())
                .with_model(completion.model.clone())
                .with_duration_ms(started.elapsed().as_millis() as u64);
            if let Some(usage) = completion.usage {
                assistant = assistant.with_usage(usage);
            }

            match engine.persist(&request, existing.is_some(), &completion, vec![user_message, assistant]).await {
                Ok(session) => yield Ok(ExchangeEvent::Saved(session)),
                Err(e) => yield Err(e),
            }
        })
    }

    fn build_request(&self, request: &ExchangeRequest, session: Option<&Session>) -> Result<CompletionRequest> {
        let mut messages = session.map(Session::chat_history).unwrap_or_default();
        messages.push(ChatMessage::user(request.prompt.clone()));

        let model = request
            .model
            .clone()
            .or_else(|| session.map(|s| s.model.clone()))
            .unwrap_or_default();
        let mut built = CompletionRequest::new(model, messages)
            .with_temperature(request.temperature.unwrap_or(self.defaults.temperature))
            .with_max_tokens(request.max_tokens.unwrap_or(self.defaults.max_tokens))
            .with_stream(request.stream.unwrap_or(self.defaults.stream));

        // A stored session pins its provider unless the caller picks a new model
        let provider = request
            .provider
            .or_else(|| session.filter(|_| request.model.is_none()).map(|s| s.provider));
        if let Some(provider) = provider {
            built = built.with_provider(provider);
        }

        let system = request
            .system
            .clone()
            .or_else(|| session.and_then(|s| s.system_prompt.clone()));
        if let Some(system) = system {
            built = built.with_system(system);
        }

        let (resolved, model) = self.router.resolve(&built)?;
        built.provider = Some(resolved.kind());
        built.model = model;
        Ok(built)
    }

    async fn persist(
        &self,
        request: &ExchangeRequest,
        existed: bool,
        completion: &Completion,
        messages: Vec<Message>,
    ) -> Result<Session> {
        let name = match &request.session {
            Some(name) => {
                if !existed {
                    self.store
                        .get_or_create(name, completion.provider, &completion.model)
                        .await?;
                }
                name.clone()
            }
            None => {
                self.store
                    .create_temp(completion.provider, &completion.model)
                    .await?
                    .name
            }
        };

        if let (false, Some(system)) = (existed, request.system.as_ref()) {
            self.store.set_system_prompt(&name, Some(system.clone())).await?;
        }
        self.store.append_all(&name, messages).await
    }
}
