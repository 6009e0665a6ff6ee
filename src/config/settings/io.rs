// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::{NexusError, Result};
use crate::storage::write_atomic;

use super::migration;
use super::Settings;

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::nexus_home().join("settings.json")
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let raw_value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| NexusError::Config(format!("{}: {}", path.display(), e)))?;
        let migrated = migration::migrate_on_load(raw_value);
        let settings: Settings = serde_json::from_value(migrated)
            .map_err(|e| NexusError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to `path`, merging with existing file content
    /// to preserve unknown keys from other code versions or hand edits.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let new_value = serde_json::to_value(self)?;

        let merged = match tokio::fs::read_to_string(path).await {
            Ok(existing_content) => match serde_json::from_str::<serde_json::Value>(&existing_content) {
                Ok(existing_value) => migration::deep_merge(existing_value, new_value),
                Err(_) => new_value, // Corrupt file, overwrite entirely.
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => new_value,
            Err(e) => return Err(e.into()),
        };

        let content = serde_json::to_string_pretty(&merged)?;
        write_atomic(path, content.as_bytes()).await?;
        tracing::debug!(target: "nexus.config", path = %path.display(), "saved settings");
        Ok(())
    }

    /// Get the nexus home directory (~/.nexus or $NEXUS_HOME).
    pub fn nexus_home() -> PathBuf {
        if let Ok(home) = std::env::var("NEXUS_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nexus")
    }

    /// Ensure the home and session directories exist.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [Self::nexus_home(), self.sessions.storage_path.clone()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}
