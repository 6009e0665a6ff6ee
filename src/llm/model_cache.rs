// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File cache for model listings fetched from providers

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::config::Settings;
use crate::error::Result;
use crate::storage::write_atomic;

const LOG_TARGET: &str = "nexus.llm.model_cache";

/// How long a cached listing stays fresh
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache key for the installed Ollama models
pub const OLLAMA_MODELS_KEY: &str = "ollama_models";

/// Model id lists stored as `<dir>/<key>.json`, aged by modification time
#[derive(Debug, Clone)]
pub struct ModelListCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ModelListCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// Cache under `~/.nexus/cache`
    pub fn in_home() -> Self {
        Self::new(Settings::nexus_home().join("cache"), MODEL_CACHE_TTL)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Cached listing if present and fresh
    pub async fn load(&self, key: &str) -> Option<Vec<String>> {
        let path = self.path(key);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let age = SystemTime::now()
            .duration_since(metadata.modified().ok()?)
            .unwrap_or_default();
        if age > self.ttl {
            tracing::debug!(target: LOG_TARGET, key, age_secs = age.as_secs(), "model cache is stale");
            return None;
        }

        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&contents) {
            Ok(models) => {
                tracing::debug!(target: LOG_TARGET, key, "model cache hit");
                Some(models)
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, key, error = %e, "failed to parse cached model list");
                None
            }
        }
    }

    pub async fn store(&self, key: &str, models: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let contents = serde_json::to_vec_pretty(models)?;
        write_atomic(&self.path(key), &contents).await
    }

    /// Cached listing, or the result of `fetch` (which then refreshes the cache)
    pub async fn get_or_fetch<F>(&self, key: &str, refresh: bool, fetch: F) -> Result<Vec<String>>
    where
        F: Future<Output = Result<Vec<String>>>,
    {
        if !refresh {
            if let Some(models) = self.load(key).await {
                return Ok(models);
            }
        }

        let models = fetch.await?;
        if let Err(e) = self.store(key, &models).await {
            tracing::warn!(target: LOG_TARGET, key, error = %e, "failed to write model cache");
        }
        Ok(models)
    }
}
