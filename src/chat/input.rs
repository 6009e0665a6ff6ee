// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Prompt assembly from attachments, piped input and prompt text.
//!
//! Parts are joined in that order, one per line. Every file and the piped
//! input go through a size-bounded read.

use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use walkdir::WalkDir;

use crate::error::{NexusError, Result};
use crate::storage::{is_sensitive_path, read_bounded, read_to_end_bounded, validate_file_path};

/// Where a chat prompt comes from
#[derive(Debug, Clone, Default)]
pub struct PromptSources {
    pub prompt: String,
    /// Files or directories whose contents are attached
    pub attachments: Vec<PathBuf>,
    pub allow_sensitive: bool,
    /// Size limit for each file and for piped input
    pub max_bytes: u64,
}

impl PromptSources {
    /// Build the final prompt. `piped` is read only when present.
    pub async fn assemble<R>(&self, piped: Option<R>) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut parts = Vec::new();

        for attachment in &self.attachments {
            for file in self.expand(attachment).await? {
                parts.push(self.read_attachment(&file).await?);
            }
        }

        if let Some(reader) = piped {
            let bytes = read_to_end_bounded(reader, self.max_bytes).await?;
            let text = String::from_utf8(bytes)
                .map_err(|_| NexusError::InvalidInput("piped input is not UTF-8 text".to_string()))?;
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }

        if !self.prompt.trim().is_empty() {
            parts.push(self.prompt.clone());
        }
        Ok(parts.join("\n"))
    }

    /// A file expands to itself; a directory to its non-hidden files.
    async fn expand(&self, attachment: &Path) -> Result<Vec<PathBuf>> {
        let metadata = tokio::fs::metadata(attachment).await?;
        if !metadata.is_dir() {
            return Ok(vec![validate_file_path(attachment, None, self.allow_sensitive).await?]);
        }

        let root = tokio::fs::canonicalize(attachment).await?;
        if !self.allow_sensitive && is_sensitive_path(&root) {
            return Err(NexusError::SensitivePathRejected(root.display().to_string()));
        }
        let candidates = tokio::task::spawn_blocking(move || walk_visible_files(&root))
            .await
            .map_err(|e| NexusError::InvalidInput(format!("directory walk failed: {}", e)))??;

        let mut files = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            files.push(validate_file_path(&candidate, None, self.allow_sensitive).await?);
        }
        tracing::debug!(
            target: "nexus.chat.input",
            dir = %attachment.display(),
            files = files.len(),
            "expanded directory attachment"
        );
        Ok(files)
    }

    async fn read_attachment(&self, path: &Path) -> Result<String> {
        let bytes = read_bounded(path, self.max_bytes).await?;
        let text = String::from_utf8(bytes)
            .map_err(|_| NexusError::InvalidInput(format!("{} is not UTF-8 text", path.display())))?;
        Ok(format!("--- {} ---\n{}", path.display(), text))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Regular files under `root` in name order, skipping hidden entries
fn walk_visible_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => NexusError::Io(io),
            None => NexusError::InvalidInput("directory loop while walking attachment".to_string()),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::DEFAULT_MAX_PAYLOAD_BYTES;
    use tempfile::TempDir;

    fn sources(prompt: &str, attachments: Vec<PathBuf>) -> PromptSources {
        PromptSources {
            prompt: prompt.to_string(),
            attachments,
            allow_sensitive: false,
            max_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    #[tokio::test]
    async fn test_prompt_only() {
        let text = sources("hello", vec![]).assemble(None::<&[u8]>).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_piped_input_precedes_prompt() {
        let text = sources("summarize this", vec![])
            .assemble(Some(&b"log line 1\nlog line 2"[..]))
            .await
            .unwrap();
        assert_eq!(text, "log line 1\nlog line 2\nsummarize this");
    }

    #[tokio::test]
    async fn test_blank_piped_input_is_ignored() {
        let text = sources("hi", vec![]).assemble(Some(&b"  \n"[..])).await.unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn test_oversize_piped_input_is_rejected() {
        let mut small = sources("hi", vec![]);
        small.max_bytes = 8;
        let result = small.assemble(Some(&b"0123456789"[..])).await;
        assert!(matches!(
            result,
            Err(NexusError::PayloadTooLarge { limit: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_directory_attachment_skips_hidden_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.rs"), "fn b() {}").unwrap();
        std::fs::write(dir.path().join(".hidden"), "secret").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "refs/heads/main").unwrap();

        let text = sources("review", vec![dir.path().to_path_buf()])
            .assemble(None::<&[u8]>)
            .await
            .unwrap();

        assert!(text.contains("fn a() {}"));
        assert!(text.contains("fn b() {}"));
        assert!(!text.contains("secret"));
        assert!(!text.contains("refs/heads/main"));
        assert!(text.ends_with("review"));
        assert!(text.find("fn a()").unwrap() < text.find("fn b()").unwrap());
    }

    #[tokio::test]
    async fn test_directory_with_sensitive_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "notes").unwrap();
        std::fs::write(dir.path().join("id_rsa"), "private").unwrap();

        let result = sources("", vec![dir.path().to_path_buf()])
            .assemble(None::<&[u8]>)
            .await;
        assert!(matches!(result, Err(NexusError::SensitivePathRejected(_))));
    }

    #[tokio::test]
    async fn test_oversize_attachment_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'x'; 64]).unwrap();

        let mut small = sources("", vec![path]);
        small.max_bytes = 16;
        assert!(matches!(
            small.assemble(None::<&[u8]>).await,
            Err(NexusError::PayloadTooLarge { .. })
        ));
    }
}
