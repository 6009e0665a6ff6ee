// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session store implementation
//!
//! One file per session under the storage root, written through the atomic
//! file store and sealed with the session key when encryption is on.
//! Mutations of one session are serialized by a per-name async lock held
//! across the whole read-modify-write; different sessions never contend.

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

use super::envelope::{self, Decoded};
use super::export::{self, ExportFormat};
use super::model::{
    ListEntry, ListReport, MatchKind, Message, SearchHit, Session, SkippedEntry, TEMP_PREFIX,
};
use crate::config::settings::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::crypto::EncryptionMode;
use crate::error::{NexusError, Result};
use crate::llm::provider::ProviderKind;
use crate::storage::{read_bounded, sanitize_session_name, session_path, validate_output_path, write_atomic};

const LOG_TARGET: &str = "nexus.session.store";

type SessionLock = Arc<tokio::sync::Mutex<()>>;

/// Persistent, optionally encrypted session storage
pub struct SessionStore {
    root: PathBuf,
    mode: EncryptionMode,
    max_payload_bytes: u64,
    locks: Mutex<HashMap<String, SessionLock>>,
}

impl SessionStore {
    /// Open a store rooted at `root`. The directory must exist.
    pub fn new(root: impl Into<PathBuf>, mode: EncryptionMode) -> Self {
        Self {
            root: root.into(),
            mode,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Cap on the size of a session file read
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: u64) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether new writes are encrypted
    pub fn encryption_mode(&self) -> &EncryptionMode {
        &self.mode
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, SessionLock>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(target: LOG_TARGET, "session lock table was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_for(&self, stem: &str) -> SessionLock {
        self.lock_table().entry(stem.to_string()).or_default().clone()
    }

    /// Drop the table entry for `stem` once the caller holds the only other handle.
    /// The caller's guard must already be released.
    fn release_lock(&self, stem: &str, lock: SessionLock) {
        let mut locks = self.lock_table();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(stem);
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.lock_table().len()
    }

    fn locate(&self, name: &str) -> Result<(String, PathBuf)> {
        let stem = sanitize_session_name(name)?;
        let path = session_path(&self.root, name)?;
        Ok((stem, path))
    }

    async fn read(&self, path: &Path, name: &str) -> Result<Decoded> {
        let bytes = match read_bounded(path, self.max_payload_bytes).await {
            Ok(bytes) => bytes,
            Err(NexusError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(NexusError::SessionNotFound(name.to_string()))
            }
            Err(e) => return Err(e),
        };
        envelope::decode(&bytes, name, &self.mode)
    }

    async fn persist(&self, path: &Path, session: &Session) -> Result<()> {
        let bytes = envelope::encode(session, &self.mode)?;
        write_atomic(path, &bytes).await
    }

    /// Locked read-modify-write of one session
    async fn update<F>(&self, name: &str, mutate: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let (stem, path) = self.locate(name)?;
        let lock = self.lock_for(&stem);
        let _guard = lock.lock().await;

        let mut session = self.read(&path, name).await?.session;
        mutate(&mut session)?;
        self.persist(&path, &session).await?;
        Ok(session)
    }

    /// Create a new, empty session
    pub async fn create(&self, name: &str, provider: ProviderKind, model: &str) -> Result<Session> {
        let (stem, path) = self.locate(name)?;
        let lock = self.lock_for(&stem);
        let _guard = lock.lock().await;

        if fs::try_exists(&path).await? {
            return Err(NexusError::SessionAlreadyExists(name.to_string()));
        }

        let session = Session::new(name.trim(), provider, model);
        self.persist(&path, &session).await?;
        tracing::info!(
            target: LOG_TARGET,
            session = %stem,
            provider = %provider,
            encrypted = self.mode.is_encrypted(),
            "created session"
        );
        Ok(session)
    }

    /// Load a session
    pub async fn open(&self, name: &str) -> Result<Session> {
        let (_, path) = self.locate(name)?;
        Ok(self.read(&path, name).await?.session)
    }

    /// Open `name`, creating it when it does not exist yet
    pub async fn get_or_create(&self, name: &str, provider: ProviderKind, model: &str) -> Result<Session> {
        match self.open(name).await {
            Err(NexusError::SessionNotFound(_)) => match self.create(name, provider, model).await {
                Err(NexusError::SessionAlreadyExists(_)) => self.open(name).await,
                other => other,
            },
            other => other,
        }
    }

    /// Append one message
    pub async fn append(&self, name: &str, message: Message) -> Result<Session> {
        self.append_all(name, vec![message]).await
    }

    /// Append several messages in a single atomic commit
    pub async fn append_all(&self, name: &str, messages: Vec<Message>) -> Result<Session> {
        let count = messages.len();
        let session = self
            .update(name, |session| {
                for message in messages {
                    session.push(message);
                }
                Ok(())
            })
            .await?;
        tracing::debug!(
            target: LOG_TARGET,
            session = %name,
            appended = count,
            total = session.message_count(),
            "appended messages"
        );
        Ok(session)
    }

    /// Replace or clear the system prompt
    pub async fn set_system_prompt(&self, name: &str, prompt: Option<String>) -> Result<Session> {
        self.update(name, |session| {
            session.system_prompt = prompt.filter(|p| !p.trim().is_empty());
            session.touch();
            Ok(())
        })
        .await
    }

    /// Switch the active provider and model
    pub async fn set_model(&self, name: &str, provider: ProviderKind, model: &str) -> Result<Session> {
        if model.trim().is_empty() {
            return Err(NexusError::InvalidInput("model must not be empty".to_string()));
        }
        self.update(name, |session| {
            session.provider = provider;
            session.model = model.trim().to_string();
            session.touch();
            Ok(())
        })
        .await
    }

    /// Remove a session. Returns whether a file was deleted.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let (stem, path) = self.locate(name)?;
        let lock = self.lock_for(&stem);
        let removed = {
            let _guard = lock.lock().await;
            fs::remove_file(&path).await
        };
        self.release_lock(&stem, lock);

        match removed {
            Ok(()) => {
                tracing::info!(target: LOG_TARGET, session = %stem, "deleted session");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a session to a new name
    pub async fn rename(&self, old: &str, new: &str) -> Result<Session> {
        let (old_stem, old_path) = self.locate(old)?;
        let (new_stem, new_path) = self.locate(new)?;

        // Fixed lock order so two opposite renames cannot deadlock
        let old_lock = self.lock_for(&old_stem);
        let new_lock = self.lock_for(&new_stem);
        let moved = {
            let (_first, _second) = if old_stem == new_stem {
                (old_lock.lock().await, None)
            } else if old_stem < new_stem {
                let first = old_lock.lock().await;
                (first, Some(new_lock.lock().await))
            } else {
                let first = new_lock.lock().await;
                (first, Some(old_lock.lock().await))
            };
            self.move_session(old, &old_path, new, &new_path, old_stem != new_stem)
                .await
        };
        self.release_lock(&old_stem, old_lock);
        self.release_lock(&new_stem, new_lock);

        let session = moved?;
        tracing::info!(target: LOG_TARGET, from = %old_stem, to = %new_stem, "renamed session");
        Ok(session)
    }

    /// Rename body; both session locks are held by the caller
    async fn move_session(
        &self,
        old: &str,
        old_path: &Path,
        new: &str,
        new_path: &Path,
        relocate: bool,
    ) -> Result<Session> {
        let mut session = self.read(old_path, old).await?.session;
        if relocate && fs::try_exists(new_path).await? {
            return Err(NexusError::SessionAlreadyExists(new.to_string()));
        }

        session.name = new.trim().to_string();
        session.touch();
        self.persist(new_path, &session).await?;
        if relocate {
            fs::remove_file(old_path).await?;
        }
        Ok(session)
    }

    /// Render a session as plaintext
    pub async fn export(&self, name: &str, format: ExportFormat) -> Result<String> {
        let session = self.open(name).await?;
        export::render(&session, format)
    }

    /// Write a plaintext export to `destination`. A directory destination
    /// gets `<session>.<ext>` inside it. Returns the resolved path.
    pub async fn export_to_file(&self, name: &str, format: ExportFormat, destination: &Path) -> Result<PathBuf> {
        let (stem, _) = self.locate(name)?;
        let target = match fs::metadata(destination).await {
            Ok(metadata) if metadata.is_dir() => {
                destination.join(format!("{}.{}", stem, format.extension()))
            }
            _ => destination.to_path_buf(),
        };
        let resolved = validate_output_path(&target, None, false).await?;

        // Plaintext must never land next to the sealed session files
        if let Ok(root) = fs::canonicalize(&self.root).await {
            if resolved.starts_with(&root) {
                return Err(NexusError::PathTraversalRejected(format!(
                    "{} is inside the session store",
                    resolved.display()
                )));
            }
        }

        let rendered = self.export(name, format).await?;
        write_atomic(&resolved, rendered.as_bytes()).await?;
        tracing::info!(
            target: LOG_TARGET,
            session = %name,
            format = %format,
            path = %resolved.display(),
            "exported session"
        );
        Ok(resolved)
    }

    /// Enumerate session files lazily, decoding each one
    fn scan(&self, include_temp: bool) -> impl Stream<Item = (String, Result<Decoded>)> + '_ {
        async_stream::stream! {
            let mut dir = match fs::read_dir(&self.root).await {
                Ok(dir) => dir,
                Err(e) if e.kind() == ErrorKind::NotFound => return,
                Err(e) => {
                    yield (self.root.display().to_string(), Err(e.into()));
                    return;
                }
            };

            loop {
                let entry = match dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        yield (self.root.display().to_string(), Err(e.into()));
                        break;
                    }
                };

                let file_name = entry.file_name().to_string_lossy().into_owned();
                let Some(stem) = file_name.strip_suffix(".json") else {
                    continue;
                };
                if !include_temp && stem.starts_with(TEMP_PREFIX) {
                    continue;
                }
                match entry.file_type().await {
                    Ok(kind) if kind.is_file() => {}
                    _ => continue,
                }

                let decoded = self.read(&entry.path(), stem).await;
                yield (file_name.clone(), decoded);
            }
        }
    }

    /// Lazy enumeration of non-temporary sessions in directory order
    pub fn entries(&self) -> impl Stream<Item = ListEntry> + '_ {
        self.scan(false).map(|(file_name, decoded)| match decoded {
            Ok(decoded) => ListEntry::Session(decoded.session.summary(decoded.encrypted)),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, file = %file_name, error = %e, "skipping unreadable session");
                ListEntry::Skipped(SkippedEntry {
                    file_name,
                    reason: e.to_string(),
                })
            }
        })
    }

    /// All sessions, most recently updated first
    pub async fn list(&self) -> Result<ListReport> {
        let mut report = ListReport::default();
        let mut entries = Box::pin(self.entries());
        while let Some(entry) = entries.next().await {
            match entry {
                ListEntry::Session(summary) => report.sessions.push(summary),
                ListEntry::Skipped(skipped) => report.skipped.push(skipped),
            }
        }
        report
            .sessions
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(report)
    }

    /// Case-insensitive search on names, then message content
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(NexusError::InvalidInput("search query must not be empty".to_string()));
        }

        let mut hits = Vec::new();
        let mut sessions = Box::pin(self.scan(false));
        while let Some((file_name, decoded)) = sessions.next().await {
            let session = match decoded {
                Ok(decoded) => decoded.session,
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, file = %file_name, error = %e, "skipping unreadable session");
                    continue;
                }
            };

            let hit = if session.name.to_lowercase().contains(&needle) {
                Some((MatchKind::Name, session.name.clone()))
            } else {
                session
                    .messages()
                    .iter()
                    .find(|m| m.content.to_lowercase().contains(&needle))
                    .map(|m| (MatchKind::Content, m.content.clone()))
            };

            if let Some((match_kind, matched_text)) = hit {
                hits.push(SearchHit {
                    session_name: session.name.clone(),
                    match_kind,
                    matched_text,
                    message_count: session.message_count(),
                    updated_at: session.updated_at,
                });
            }
        }

        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(hits)
    }

    /// Create a throwaway `.temp-<millis>` session
    pub async fn create_temp(&self, provider: ProviderKind, model: &str) -> Result<Session> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        for offset in 0..16u128 {
            let name = format!("{}{}", TEMP_PREFIX, millis + offset);
            match self.create(&name, provider, model).await {
                Err(NexusError::SessionAlreadyExists(_)) => continue,
                other => return other,
            }
        }
        Err(NexusError::SessionAlreadyExists(format!("{}{}", TEMP_PREFIX, millis)))
    }

    /// Delete temporary sessions not modified within `max_age`
    pub async fn cleanup_temp(&self, max_age: Duration) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = file_name.strip_suffix(".json") else {
                continue;
            };
            if !stem.starts_with(TEMP_PREFIX) {
                continue;
            }

            let age = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified.elapsed().unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, file = %file_name, error = %e, "cannot stat temp session");
                    continue;
                }
            };
            if age < max_age {
                continue;
            }

            let lock = self.lock_for(stem);
            let outcome = {
                let _guard = lock.lock().await;
                fs::remove_file(entry.path()).await
            };
            self.release_lock(stem, lock);
            match outcome {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(target: LOG_TARGET, file = %file_name, "removed temp session");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, file = %file_name, error = %e, "failed to remove temp session")
                }
            }
        }

        if removed > 0 {
            tracing::info!(target: LOG_TARGET, removed, "cleaned up temp sessions");
        }
        Ok(removed)
    }
}
