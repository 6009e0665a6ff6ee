// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session records
//!
//! A session is an append-only conversation. Messages can only be added
//! through the store, so callers see them as a read-only slice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::message::{ChatMessage, Role};
use crate::llm::provider::{ProviderKind, Usage};

/// Prefix of temporary session names
pub const TEMP_PREFIX: &str = ".temp-";

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Model that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Wall-clock generation time of an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            usage: None,
            model: None,
            duration_ms: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Strip storage metadata for a provider request
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    messages: Vec<Message>,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>, provider: ProviderKind, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            provider,
            model: model.into(),
            system_prompt: None,
            total_tokens: 0,
            messages: Vec::new(),
        }
    }

    /// Messages in append order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_temp(&self) -> bool {
        self.name.starts_with(TEMP_PREFIX)
    }

    /// History as provider messages
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }

    pub(crate) fn push(&mut self, message: Message) {
        if let Some(usage) = message.usage {
            self.total_tokens += u64::from(usage.total_tokens);
        }
        self.messages.push(message);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn summary(&self, encrypted: bool) -> SessionSummary {
        SessionSummary {
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            provider: self.provider,
            model: self.model.clone(),
            message_count: self.messages.len(),
            total_tokens: self.total_tokens,
            encrypted,
        }
    }
}

/// Listing entry for a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provider: ProviderKind,
    pub model: String,
    pub message_count: usize,
    pub total_tokens: u64,
    pub encrypted: bool,
}

/// Where a search query matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Name,
    Content,
}

/// One search result, at most one per session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub session_name: String,
    pub match_kind: MatchKind,
    pub matched_text: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Session file that could not be listed
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub file_name: String,
    pub reason: String,
}

/// One item of a lazy store enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum ListEntry {
    Session(SessionSummary),
    Skipped(SkippedEntry),
}

/// Result of listing the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListReport {
    /// Readable sessions, most recently updated first
    pub sessions: Vec<SessionSummary>,
    /// Entries that were malformed or could not be decrypted
    pub skipped: Vec<SkippedEntry>,
}
