// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Nexus
//!
//! Handles loading and saving settings from ~/.nexus/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::provider::ProviderKind;

mod io;
mod migration;
mod validation;

/// Default bound for any single read from session storage, stdin or a file
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Main settings structure, stored in ~/.nexus/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// LLM provider configurations
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Default settings for new requests
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Retry and resilience settings for API calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Session storage settings
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai_config")]
    pub openai: ProviderConfig,

    #[serde(default = "default_anthropic_config")]
    pub anthropic: ProviderConfig,

    /// Local models, no API key required
    #[serde(default = "default_ollama_config")]
    pub ollama: ProviderConfig,

    /// 100+ models via a single OpenAI-compatible API
    #[serde(default = "default_openrouter_config")]
    pub openrouter: ProviderConfig,
}

/// Per-provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether the router may dispatch to this provider
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL for API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default model to use
    pub default_model: String,
}

/// Default settings for new requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default provider to use
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Default temperature for LLM
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whether to use streaming by default
    #[serde(default = "default_true")]
    pub stream: bool,
}

/// Retry and resilience configuration for API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Ceiling for a single network call (connect, or waiting on the next chunk)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// How sessions are protected at rest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionPolicy {
    /// Encrypt when a key is available; refuse to start otherwise unless
    /// plaintext is explicitly allowed for this run
    #[default]
    Auto,
    /// Encrypt, and never accept plaintext mode
    Required,
    /// Plaintext sessions, chosen explicitly in configuration
    Disabled,
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one file per session
    #[serde(default = "default_sessions_path")]
    pub storage_path: PathBuf,

    #[serde(default)]
    pub encryption: EncryptionPolicy,

    /// Upper bound for reading a session file
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    /// Age after which temporary sessions are removed
    #[serde(default = "default_temp_retention_hours")]
    pub temp_retention_hours: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai_config(),
            anthropic: default_anthropic_config(),
            ollama: default_ollama_config(),
            openrouter: default_openrouter_config(),
        }
    }
}

impl ProvidersConfig {
    /// Configuration for a provider kind
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::OpenRouter => &self.openrouter,
        }
    }

    /// Mutable configuration for a provider kind
    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
            ProviderKind::Ollama => &mut self.ollama,
            ProviderKind::OpenRouter => &mut self.openrouter,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: true,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            storage_path: default_sessions_path(),
            encryption: EncryptionPolicy::default(),
            max_payload_bytes: default_max_payload_bytes(),
            temp_retention_hours: default_temp_retention_hours(),
        }
    }
}

fn provider_config(api_key_env: Option<&str>, default_model: &str) -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        api_key: None,
        api_key_env: api_key_env.map(str::to_string),
        base_url: None,
        default_model: default_model.to_string(),
    }
}

fn default_openai_config() -> ProviderConfig {
    provider_config(Some("OPENAI_API_KEY"), "gpt-4o")
}

fn default_anthropic_config() -> ProviderConfig {
    provider_config(Some("ANTHROPIC_API_KEY"), "claude-sonnet-4-20250514")
}

fn default_ollama_config() -> ProviderConfig {
    provider_config(None, "llama3.2:latest")
}

fn default_openrouter_config() -> ProviderConfig {
    provider_config(Some("OPENROUTER_API_KEY"), "anthropic/claude-sonnet-4")
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_sessions_path() -> PathBuf {
    Settings::nexus_home().join("sessions")
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_temp_retention_hours() -> u64 {
    24
}

// Resilience config defaults
fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    16000
}

fn default_jitter() -> f64 {
    0.25
}

fn default_request_timeout_secs() -> u64 {
    60
}
