// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Nexus
//!
//! This module defines all error types used throughout the application.
//! Storage and crypto failures are kept distinct so callers can tell
//! "wrong key / tampered" apart from "corrupted format" and "not found".

use std::time::Duration;
use thiserror::Error;

/// Main error type for Nexus operations
#[derive(Error, Debug)]
pub enum NexusError {
    /// Provider errors, already normalized into the shared taxonomy
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// No platform credential backend is reachable
    #[error("Credential store unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// Decryption failed: wrong key or tampered ciphertext
    #[error("Authentication failed: {0} (wrong key or tampered session)")]
    AuthenticationFailed(String),

    /// A read exceeded the configured size bound
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Session name already in use
    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    /// Session does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Name or path tried to escape the storage root
    #[error("Path rejected: {0}")]
    PathTraversalRejected(String),

    /// Path points at a file that looks like a credential
    #[error("Sensitive file access blocked: {0}")]
    SensitivePathRejected(String),

    /// Session file could be read but not understood
    #[error("Corrupted session '{name}': {reason}")]
    CorruptedSession { name: String, reason: String },

    /// Unknown export format or file format version
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Provider error taxonomy shared by every provider variant
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Rate limited by the provider, with its requested backoff if any
    #[error("Rate limited{}", format_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Credentials missing or rejected
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Provider rejected the request itself
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout waiting for the provider
    #[error("Request timed out")]
    Timeout,

    /// Provider unreachable or overloaded
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Anything else
    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Whether the router may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Timeout | ApiError::ProviderUnavailable(_)
        )
    }
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(": retry after {} seconds", d.as_secs()))
        .unwrap_or_default()
}

/// Result type alias for Nexus operations
pub type Result<T> = std::result::Result<T, NexusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display_with_retry_after() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "Rate limited: retry after 30 seconds");
    }

    #[test]
    fn test_rate_limited_display_without_retry_after() {
        let err = ApiError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limited");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::RateLimited { retry_after: None }.is_transient());
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::ProviderUnavailable("503".to_string()).is_transient());

        assert!(!ApiError::AuthError("bad key".to_string()).is_transient());
        assert!(!ApiError::InvalidRequest("bad model".to_string()).is_transient());
        assert!(!ApiError::Unknown("?".to_string()).is_transient());
    }

    #[test]
    fn test_payload_too_large_display() {
        let err = NexusError::PayloadTooLarge {
            size: 20,
            limit: 10,
        };
        assert!(err.to_string().contains("20 bytes"));
        assert!(err.to_string().contains("10 bytes"));
    }

    #[test]
    fn test_authentication_failed_is_distinct_from_corruption() {
        let auth = NexusError::AuthenticationFailed("proj-a".to_string());
        let corrupt = NexusError::CorruptedSession {
            name: "proj-a".to_string(),
            reason: "bad json".to_string(),
        };
        assert!(auth.to_string().contains("wrong key"));
        assert!(corrupt.to_string().contains("Corrupted"));
    }

    #[test]
    fn test_from_api_error() {
        let err: NexusError = ApiError::Timeout.into();
        assert!(matches!(err, NexusError::Api(ApiError::Timeout)));
        assert!(err.to_string().contains("API error"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NexusError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn test_fn() -> Result<i32> {
            Err(NexusError::Cancelled)
        }

        assert!(test_fn().is_err());
    }
}
