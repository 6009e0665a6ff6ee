// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Provides a scripted implementation of the LlmProvider trait that can be
//! used in tests without making real API calls. Each call consumes the next
//! scripted reply; the last reply repeats once the script runs out.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ApiError, Result};
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, ProviderKind,
    ResponseChunk, Usage,
};

/// What the mock does for one call
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Stream these deltas, then `Done`
    Text { chunks: Vec<String>, usage: Usage },
    /// Reject the request before any output
    Fail(ApiError),
    /// Stream some deltas, then fail mid-stream
    FailAfter { chunks: Vec<String>, error: ApiError },
    /// Never answer the request
    Hang,
    /// Stream some deltas, then stall forever
    StallAfter(Vec<String>),
}

impl MockReply {
    /// A successful reply split into the given chunks
    pub fn text<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        let chunks: Vec<String> = chunks.into_iter().map(Into::into).collect();
        let completion = chunks.iter().map(|c| c.split_whitespace().count() as u32).sum();
        MockReply::Text {
            chunks,
            usage: Usage::new(10, completion),
        }
    }
}

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    replies: Arc<Mutex<Vec<MockReply>>>,
    call_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    models: Vec<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a mock standing in for `kind`, answering "mock response"
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            replies: Arc::new(Mutex::new(vec![MockReply::text(["mock response"])])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
            models: vec!["mock-model".to_string()],
        }
    }

    /// Answer every call with `text` in a single chunk
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_replies(vec![MockReply::text([text.into()])])
    }

    /// Queue replies (consumed in order, the last one repeats)
    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        *lock(&self.replies) = replies;
        self
    }

    /// Model ids this mock claims to support
    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Number of requests received
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    fn next_reply(&self, request: &CompletionRequest) -> MockReply {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded_requests).push(request.clone());

        let replies = lock(&self.replies);
        match replies.len() {
            0 => MockReply::text(["mock response"]),
            len => replies[count.min(len - 1)].clone(),
        }
    }
}

fn deltas(chunks: Vec<String>) -> impl futures::Stream<Item = ResponseChunk> + Send {
    stream::iter(chunks.into_iter().map(ResponseChunk::Delta))
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.models
            .iter()
            .map(|id| ModelInfo::new(id, id, 128_000))
            .collect()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        match self.next_reply(&request) {
            MockReply::Text { chunks, usage } => Ok(CompletionResponse {
                model,
                content: chunks.concat(),
                usage: Some(usage),
                finish_reason: Some("stop".to_string()),
            }),
            MockReply::Fail(error) | MockReply::FailAfter { error, .. } => Err(error.into()),
            MockReply::Hang | MockReply::StallAfter(_) => std::future::pending().await,
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        match self.next_reply(&request) {
            MockReply::Text { chunks, usage } => Ok(Box::pin(deltas(chunks).chain(stream::once(
                async move {
                    ResponseChunk::Done {
                        usage: Some(usage),
                        finish_reason: Some("stop".to_string()),
                    }
                },
            )))),
            MockReply::Fail(error) => Err(error.into()),
            MockReply::FailAfter { chunks, error } => Ok(Box::pin(
                deltas(chunks).chain(stream::once(async move { ResponseChunk::Error(error) })),
            )),
            MockReply::Hang => std::future::pending().await,
            MockReply::StallAfter(chunks) => Ok(Box::pin(deltas(chunks).chain(stream::pending()))),
        }
    }
}
