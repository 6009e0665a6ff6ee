// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Atomic file replacement and bounded reads
//!
//! A write goes to a uniquely named temp file next to the destination, is
//! flushed and synced, then renamed over the destination. Readers see either
//! the old file or the new one, never a mix.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{NexusError, Result};

/// Bytes written to a temp file but not yet visible at the destination.
///
/// Dropping without `commit` removes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Rename the temp file over the destination and sync the directory.
    pub async fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp_path, &self.dest).await?;
        self.committed = true;

        if let Some(dir) = self.dest.parent() {
            sync_dir(dir).await;
        }
        Ok(())
    }

    /// Discard the staged bytes.
    pub async fn abort(mut self) -> Result<()> {
        self.committed = true;
        match fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn temp_path_for(dest: &Path) -> Result<PathBuf> {
    let dir = dest
        .parent()
        .ok_or_else(|| NexusError::InvalidInput(format!("{} has no parent", dest.display())))?;
    let file_name = dest
        .file_name()
        .ok_or_else(|| NexusError::InvalidInput(format!("{} has no file name", dest.display())))?;

    Ok(dir.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

/// Write `bytes` to a fresh temp file beside `dest` and sync it.
pub async fn stage(dest: &Path, bytes: &[u8]) -> Result<StagedWrite> {
    let staged = StagedWrite {
        temp_path: temp_path_for(dest)?,
        dest: dest.to_path_buf(),
        committed: false,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staged.temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;

    Ok(staged)
}

/// Replace `dest` with `bytes` atomically.
pub async fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    stage(dest, bytes).await?.commit().await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) {
    match fs::File::open(dir).await {
        Ok(handle) => {
            if let Err(e) = handle.sync_all().await {
                tracing::debug!(
                    target: "nexus.storage",
                    dir = %dir.display(),
                    error = %e,
                    "directory sync failed"
                );
            }
        }
        Err(e) => {
            tracing::debug!(
                target: "nexus.storage",
                dir = %dir.display(),
                error = %e,
                "could not open directory for sync"
            );
        }
    }
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) {}

/// Read at most `max_bytes` from `reader`, failing instead of truncating.
pub async fn read_to_end_bounded<R>(reader: R, max_bytes: u64) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buf)
        .await?;

    let size = buf.len() as u64;
    if size > max_bytes {
        return Err(NexusError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(buf)
}

/// Read a whole file, rejecting anything over `max_bytes` before buffering it.
pub async fn read_bounded(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    if size > max_bytes {
        return Err(NexusError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    // The file may grow between the metadata check and the read.
    read_to_end_bounded(file, max_bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");

        write_atomic(&path, b"first").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_stage_leaves_old_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");
        write_atomic(&path, b"old").await.unwrap();

        let staged = stage(&path, b"new").await.unwrap();
        assert!(staged.temp_path().exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"old");

        let temp = staged.temp_path().to_path_buf();
        drop(staged);
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_abort_removes_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");

        let staged = stage(&path, b"data").await.unwrap();
        let temp = staged.temp_path().to_path_buf();
        staged.abort().await.unwrap();
        assert!(!temp.exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");

        let a = stage(&path, b"a").await.unwrap();
        let b = stage(&path, b"b").await.unwrap();
        assert_ne!(a.temp_path(), b.temp_path());
        assert_eq!(a.destination(), b.destination());
    }

    #[tokio::test]
    async fn test_read_bounded_within_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small");
        std::fs::write(&path, b"12345").unwrap();

        assert_eq!(read_bounded(&path, 5).await.unwrap(), b"12345");
    }

    #[tokio::test]
    async fn test_read_bounded_rejects_oversize() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let err = read_bounded(&path, 32).await.unwrap_err();
        assert!(matches!(
            err,
            NexusError::PayloadTooLarge {
                size: 64,
                limit: 32
            }
        ));
    }

    #[tokio::test]
    async fn test_read_to_end_bounded_from_reader() {
        let data: &[u8] = &[1u8; 100];
        let err = read_to_end_bounded(data, 50).await.unwrap_err();
        assert!(matches!(err, NexusError::PayloadTooLarge { size: 51, .. }));

        let data: &[u8] = &[1u8; 10];
        assert_eq!(read_to_end_bounded(data, 50).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_read_bounded_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_bounded(&dir.path().join("nope"), 10).await.unwrap_err();
        match err {
            NexusError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
