// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Process context
//!
//! Everything a command needs is built here once and passed down
//! explicitly: settings, the resolved encryption mode, the session store,
//! the provider router and the chat engine.

use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatEngine;
use crate::config::{EncryptionPolicy, Settings};
use crate::crypto::{vault::current_identity, EncryptionMode, EnvVault, KeyVault, KeyringVault};
use crate::error::{NexusError, Result};
use crate::llm::router::ProviderRouter;
use crate::session::SessionStore;

const LOG_TARGET: &str = "nexus.app";

/// What the user allowed for this run when no key can be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionChoice {
    /// Fail if no key is available
    #[default]
    RequireKey,
    /// Fall back to plaintext sessions (`--allow-plaintext`)
    AllowPlaintext,
}

/// Explicitly constructed application state
pub struct AppContext {
    settings: Settings,
    store: Arc<SessionStore>,
    router: Arc<ProviderRouter>,
    engine: ChatEngine,
}

impl AppContext {
    /// Build the context with the platform credential store and the
    /// `NEXUS_ENCRYPTION_KEY` fallback
    pub async fn initialize(settings: Settings, choice: EncryptionChoice) -> Result<Self> {
        let vaults: Vec<Arc<dyn KeyVault>> = vec![Arc::new(KeyringVault::new()), Arc::new(EnvVault::new())];
        Self::initialize_with(settings, choice, vaults).await
    }

    /// Build the context trying `vaults` in order
    pub async fn initialize_with(
        settings: Settings,
        choice: EncryptionChoice,
        vaults: Vec<Arc<dyn KeyVault>>,
    ) -> Result<Self> {
        settings.validate()?;
        tokio::fs::create_dir_all(&settings.sessions.storage_path).await?;

        let mode = resolve_encryption(&settings, choice, &vaults).await?;
        let store = Arc::new(
            SessionStore::new(settings.sessions.storage_path.clone(), mode)
                .with_max_payload_bytes(settings.sessions.max_payload_bytes),
        );
        let router = Arc::new(ProviderRouter::from_settings(&settings));
        let engine = ChatEngine::new(store.clone(), router.clone(), settings.defaults.clone());

        let retention = Duration::from_secs(settings.sessions.temp_retention_hours.saturating_mul(3600));
        if let Err(e) = store.cleanup_temp(retention).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "temp session cleanup failed");
        }

        Ok(Self {
            settings,
            store,
            router,
            engine,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }
}

/// Decide how sessions are written for this run
pub async fn resolve_encryption(
    settings: &Settings,
    choice: EncryptionChoice,
    vaults: &[Arc<dyn KeyVault>],
) -> Result<EncryptionMode> {
    if settings.sessions.encryption == EncryptionPolicy::Disabled {
        tracing::warn!(target: LOG_TARGET, "session encryption disabled in settings");
        return Ok(EncryptionMode::Plaintext);
    }

    let identity = current_identity();
    let mut failures = Vec::new();
    for vault in vaults {
        let lookup = vault.clone();
        let who = identity.clone();
        // Credential backends may block on IPC
        let result = tokio::task::spawn_blocking(move || lookup.get_or_create_key(&who))
            .await
            .map_err(|e| NexusError::KeyStoreUnavailable(format!("key lookup task failed: {}", e)))?;

        match result {
            Ok(key) => {
                tracing::debug!(target: LOG_TARGET, vault = vault.describe(), "session key loaded");
                return Ok(EncryptionMode::Encrypted(key));
            }
            Err(NexusError::KeyStoreUnavailable(reason)) => {
                tracing::debug!(target: LOG_TARGET, vault = vault.describe(), %reason, "key source unavailable");
                failures.push(format!("{}: {}", vault.describe(), reason));
            }
            Err(e) => return Err(e),
        }
    }

    let reason = failures.join("; ");
    match (settings.sessions.encryption, choice) {
        (EncryptionPolicy::Auto, EncryptionChoice::AllowPlaintext) => {
            tracing::warn!(target: LOG_TARGET, %reason, "no encryption key available, sessions will be stored in plaintext");
            Ok(EncryptionMode::Plaintext)
        }
        (EncryptionPolicy::Required, _) => Err(NexusError::KeyStoreUnavailable(format!(
            "{} (encryption is required by settings)",
            reason
        ))),
        _ => Err(NexusError::KeyStoreUnavailable(format!(
            "{} (set NEXUS_ENCRYPTION_KEY or re-run with --allow-plaintext)",
            reason
        ))),
    }
}
