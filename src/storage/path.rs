// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Path guard
//!
//! Session names become file names under the storage root and must never
//! reach outside it. User-supplied file paths (prompt input, export target)
//! are canonicalized and checked against a base directory and a list of
//! credential-looking files.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{NexusError, Result};

const MAX_NAME_LEN: usize = 200;

const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const SENSITIVE_PATTERNS: &[&str] = &[
    r"(?i)(^|/)\.env[^/]*$",
    r"(?i)\.(pem|key|p12|pfx)$",
    r"(?i)(^|/)id_(rsa|dsa|ecdsa|ed25519)[^/]*$",
    r"(?i)(^|/)\.aws/credentials$",
    r"(?i)(^|/)\.kube/config$",
    r"(?i)(^|/)credentials\.json$",
    r"(?i)(^|/)secrets\.ya?ml$",
    r"(?i)(^|/)\.(npmrc|pypirc|netrc|dockercfg)$",
    r"(?i)(^|/)\.docker/config\.json$",
];

const SENSITIVE_DIRS: &[&str] = &[".ssh", ".aws", ".kube", ".gnupg", ".docker"];

fn sensitive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SENSITIVE_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Turn a user-chosen session name into a safe file stem.
///
/// Traversal attempts are rejected outright; other reserved characters are
/// replaced with `_`.
pub fn sanitize_session_name(name: &str) -> Result<String> {
    if name.contains('\0') {
        return Err(NexusError::PathTraversalRejected(
            "session name contains a null byte".to_string(),
        ));
    }
    if name.contains("..") {
        return Err(NexusError::PathTraversalRejected(format!(
            "session name '{}' contains '..'",
            name
        )));
    }
    if name.starts_with('/') || name.starts_with('\\') || has_drive_prefix(name) {
        return Err(NexusError::PathTraversalRejected(format!(
            "session name '{}' is an absolute path",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if INVALID_NAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = sanitized.trim().trim_end_matches('.').to_string();

    if sanitized.is_empty() {
        return Err(NexusError::InvalidInput(
            "session name must not be empty".to_string(),
        ));
    }
    if sanitized.chars().count() > MAX_NAME_LEN {
        return Err(NexusError::InvalidInput(format!(
            "session name is longer than {} characters",
            MAX_NAME_LEN
        )));
    }

    Ok(sanitized)
}

fn has_drive_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// File path for session `name` under `root`.
pub fn session_path(root: &Path, name: &str) -> Result<PathBuf> {
    let stem = sanitize_session_name(name)?;
    let path = root.join(format!("{}.json", stem));

    if path.parent() != Some(root) {
        return Err(NexusError::PathTraversalRejected(format!(
            "session name '{}' escapes the storage root",
            name
        )));
    }
    Ok(path)
}

/// Whether `path` looks like a credential or secret file.
pub fn is_sensitive_path(path: &Path) -> bool {
    let in_sensitive_dir = path.components().any(|c| match c {
        Component::Normal(part) => SENSITIVE_DIRS.iter().any(|d| part == *d),
        _ => false,
    });
    if in_sensitive_dir {
        return true;
    }

    let normalized = path.to_string_lossy().replace('\\', "/");
    sensitive_patterns().iter().any(|re| re.is_match(&normalized))
}

fn check_placement(resolved: &Path, base_dir: Option<&Path>, base: Option<PathBuf>) -> Result<()> {
    if let (Some(requested), Some(base)) = (base_dir, base) {
        if !resolved.starts_with(&base) {
            return Err(NexusError::PathTraversalRejected(format!(
                "{} is outside {}",
                resolved.display(),
                requested.display()
            )));
        }
    }
    Ok(())
}

async fn canonical_base(base_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    match base_dir {
        Some(dir) => Ok(Some(tokio::fs::canonicalize(dir).await?)),
        None => Ok(None),
    }
}

/// Validate an existing file the user asked us to read.
///
/// Returns the canonical path.
pub async fn validate_file_path(
    path: &Path,
    base_dir: Option<&Path>,
    allow_sensitive: bool,
) -> Result<PathBuf> {
    if path.to_string_lossy().contains('\0') {
        return Err(NexusError::PathTraversalRejected(
            "path contains a null byte".to_string(),
        ));
    }

    let resolved = tokio::fs::canonicalize(path).await?;
    check_placement(&resolved, base_dir, canonical_base(base_dir).await?)?;

    if !allow_sensitive && is_sensitive_path(&resolved) {
        return Err(NexusError::SensitivePathRejected(
            resolved.display().to_string(),
        ));
    }

    let metadata = tokio::fs::metadata(&resolved).await?;
    if !metadata.is_file() {
        return Err(NexusError::InvalidInput(format!(
            "{} is not a regular file",
            resolved.display()
        )));
    }

    Ok(resolved)
}

/// Validate a destination the user asked us to write.
///
/// The file itself may not exist yet; its parent directory must.
pub async fn validate_output_path(
    path: &Path,
    base_dir: Option<&Path>,
    allow_sensitive: bool,
) -> Result<PathBuf> {
    if path.to_string_lossy().contains('\0') {
        return Err(NexusError::PathTraversalRejected(
            "path contains a null byte".to_string(),
        ));
    }

    let file_name = match path.components().next_back() {
        Some(Component::Normal(name)) => name.to_os_string(),
        _ => {
            return Err(NexusError::InvalidInput(format!(
                "{} does not name a file",
                path.display()
            )))
        }
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let resolved = tokio::fs::canonicalize(&parent).await?.join(file_name);
    check_placement(&resolved, base_dir, canonical_base(base_dir).await?)?;

    if !allow_sensitive && is_sensitive_path(&resolved) {
        return Err(NexusError::SensitivePathRejected(
            resolved.display().to_string(),
        ));
    }

    if let Ok(metadata) = tokio::fs::metadata(&resolved).await {
        if metadata.is_dir() {
            return Err(NexusError::InvalidInput(format!(
                "{} is a directory",
                resolved.display()
            )));
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(sanitize_session_name("proj-a").unwrap(), "proj-a");
        assert_eq!(sanitize_session_name("  my chat  ").unwrap(), "my chat");
    }

    #[test]
    fn test_sanitize_replaces_reserved_chars() {
        assert_eq!(sanitize_session_name("ab:c|d?e*").unwrap(), "ab_c_d_e_");
        assert_eq!(sanitize_session_name("dir/name").unwrap(), "dir_name");
        assert_eq!(sanitize_session_name("<x>\"y\"").unwrap(), "_x__y_");
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        for name in ["../etc/passwd", "..", "a/../b", "x..y"] {
            assert!(
                matches!(
                    sanitize_session_name(name),
                    Err(NexusError::PathTraversalRejected(_))
                ),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_sanitize_rejects_absolute_and_null() {
        for name in ["/etc/passwd", "\\server\\share", "C:\\Windows", "bad\0name"] {
            assert!(matches!(
                sanitize_session_name(name),
                Err(NexusError::PathTraversalRejected(_))
            ));
        }
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(matches!(
            sanitize_session_name("   "),
            Err(NexusError::InvalidInput(_))
        ));
        assert!(matches!(
            sanitize_session_name(""),
            Err(NexusError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_session_path_under_root() {
        let root = Path::new("/data/sessions");
        let path = session_path(root, "proj-a").unwrap();
        assert_eq!(path, PathBuf::from("/data/sessions/proj-a.json"));
    }

    #[test]
    fn test_sensitive_files_detected() {
        for p in [
            "/home/u/project/.env",
            "/home/u/project/.env.local",
            "/home/u/server.pem",
            "/home/u/tls.KEY",
            "/home/u/.ssh/config",
            "/home/u/.ssh/id_rsa",
            "/home/u/keys/id_ed25519.pub",
            "/home/u/.aws/credentials",
            "/home/u/.kube/config",
            "/srv/app/credentials.json",
            "/srv/app/secrets.yaml",
            "/home/u/.netrc",
            "/home/u/.docker/config.json",
        ] {
            assert!(is_sensitive_path(Path::new(p)), "{} should be sensitive", p);
        }
    }

    #[test]
    fn test_ordinary_files_not_sensitive() {
        for p in [
            "/home/u/notes.md",
            "/home/u/environment.txt",
            "/home/u/src/keyboard.rs",
            "/home/u/config.json",
        ] {
            assert!(!is_sensitive_path(Path::new(p)), "{} flagged", p);
        }
    }

    #[tokio::test]
    async fn test_validate_file_path_inside_base() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("prompt.txt");
        std::fs::write(&file, "hi").unwrap();

        let resolved = validate_file_path(&file, Some(dir.path()), false)
            .await
            .unwrap();
        assert!(resolved.ends_with("prompt.txt"));
    }

    #[tokio::test]
    async fn test_validate_file_path_outside_base() {
        let base = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let file = other.path().join("prompt.txt");
        std::fs::write(&file, "hi").unwrap();

        let err = validate_file_path(&file, Some(base.path()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::PathTraversalRejected(_)));
    }

    #[tokio::test]
    async fn test_validate_file_path_dotdot_escape() {
        let base = TempDir::new().unwrap();
        let inner = base.path().join("inner");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(base.path().join("outside.txt"), "x").unwrap();

        let sneaky = inner.join("..").join("outside.txt");
        let err = validate_file_path(&sneaky, Some(&inner), false)
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::PathTraversalRejected(_)));
    }

    #[tokio::test]
    async fn test_validate_file_path_sensitive() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join(".env");
        std::fs::write(&env, "SECRET=1").unwrap();

        let err = validate_file_path(&env, None, false).await.unwrap_err();
        assert!(matches!(err, NexusError::SensitivePathRejected(_)));
        assert!(validate_file_path(&env, None, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_file_path_missing() {
        let dir = TempDir::new().unwrap();
        let err = validate_file_path(&dir.path().join("nope.txt"), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::Io(_)));
    }

    #[tokio::test]
    async fn test_validate_output_path_new_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("export.md");
        let resolved = validate_output_path(&out, Some(dir.path()), false)
            .await
            .unwrap();
        assert!(resolved.ends_with("export.md"));
    }

    #[tokio::test]
    async fn test_validate_output_path_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let err = validate_output_path(dir.path(), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidInput(_)));
    }

    proptest! {
        #[test]
        fn prop_sanitized_names_stay_under_root(name in "\\PC{0,40}") {
            let root = Path::new("/data/sessions");
            if let Ok(path) = session_path(root, &name) {
                prop_assert_eq!(path.parent(), Some(root));
                let stem = path.file_stem().unwrap().to_string_lossy().to_string();
                prop_assert!(!stem.contains('/'));
                prop_assert!(!stem.contains('\\'));
                prop_assert!(!stem.contains(".."));
            }
        }

        #[test]
        fn prop_sanitize_is_idempotent(name in "[a-zA-Z0-9 _:|?*<>-]{1,30}") {
            if let Ok(once) = sanitize_session_name(&name) {
                prop_assert_eq!(sanitize_session_name(&once).unwrap(), once.clone());
            }
        }
    }
}
