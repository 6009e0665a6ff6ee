// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use crate::error::{NexusError, Result};
use crate::llm::provider::{ModelInfo, ProviderKind};

use super::Settings;

impl Settings {
    /// Get the API key for a provider, checking env var first.
    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        let config = self.providers.get(kind);
        // Priority: env var > config file.
        config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
            .or_else(|| config.api_key.clone())
    }

    /// Check if the given provider has a usable configuration.
    pub fn is_provider_configured(&self, kind: ProviderKind) -> bool {
        let config = self.providers.get(kind);
        if !config.enabled {
            return false;
        }
        match kind {
            // Ollama doesn't require an API key
            ProviderKind::Ollama => true,
            _ => self.api_key(kind).is_some(),
        }
    }

    /// Per-call network timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.resilience.request_timeout_secs)
    }

    /// The provider and model used when a request names neither
    pub fn default_selection(&self) -> (ProviderKind, &str) {
        let kind = self.defaults.provider;
        (kind, self.providers.get(kind).default_model.as_str())
    }

    /// Make `selection` the default model.
    ///
    /// The provider comes from `provider`, else a `provider/model` prefix,
    /// else the single catalog entry listing the model, else the current
    /// default provider. A model listed by several providers is ambiguous.
    pub fn set_default_model(
        &mut self,
        selection: &str,
        provider: Option<ProviderKind>,
        catalog: &[(ProviderKind, ModelInfo)],
    ) -> Result<(ProviderKind, String)> {
        let selection = selection.trim();
        if selection.is_empty() {
            return Err(NexusError::InvalidInput("model must not be empty".to_string()));
        }

        let prefixed = selection
            .split_once('/')
            .and_then(|(prefix, rest)| Some((prefix.parse::<ProviderKind>().ok()?, rest)))
            .filter(|(_, rest)| !rest.is_empty());

        let (kind, model) = match (provider, prefixed) {
            (Some(kind), _) => (kind, selection),
            (None, Some((kind, rest))) => (kind, rest),
            (None, None) => {
                let owners: Vec<ProviderKind> = catalog
                    .iter()
                    .filter(|(_, info)| info.id.eq_ignore_ascii_case(selection))
                    .map(|(kind, _)| *kind)
                    .collect();
                match owners.as_slice() {
                    [] => (self.defaults.provider, selection),
                    [kind] => (*kind, selection),
                    _ => {
                        return Err(NexusError::InvalidInput(format!(
                            "model '{}' is offered by several providers; specify it as provider/model",
                            selection
                        )))
                    }
                }
            }
        };

        self.defaults.provider = kind;
        self.providers.get_mut(kind).default_model = model.to_string();
        Ok((kind, model.to_string()))
    }

    /// Reject values the rest of the system cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(NexusError::Config(format!(
                "defaults.temperature must be between 0.0 and 2.0, got {}",
                self.defaults.temperature
            )));
        }
        if self.defaults.max_tokens == 0 {
            return Err(NexusError::Config(
                "defaults.max_tokens must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.resilience.jitter) {
            return Err(NexusError::Config(format!(
                "resilience.jitter must be between 0.0 and 1.0, got {}",
                self.resilience.jitter
            )));
        }
        if self.resilience.base_delay_ms > self.resilience.max_delay_ms {
            return Err(NexusError::Config(
                "resilience.base_delay_ms must not exceed resilience.max_delay_ms".to_string(),
            ));
        }
        if self.resilience.request_timeout_secs == 0 {
            return Err(NexusError::Config(
                "resilience.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.sessions.max_payload_bytes == 0 {
            return Err(NexusError::Config(
                "sessions.max_payload_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
