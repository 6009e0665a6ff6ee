// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! On-disk session envelope
//!
//! ```json
//! { "format_version": 1,
//!   "encryption": null | { "algorithm": "aes-256-gcm", "key_version": 1 },
//!   "session": { ... } | "ciphertext": "<base64 nonce||ct>" }
//! ```
//!
//! Files without `format_version` are read as a bare plaintext session.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::model::Session;
use crate::crypto::{self, EncryptionMode, SessionKey};
use crate::error::{NexusError, Result};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionHeader {
    pub algorithm: String,
    pub key_version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    encryption: Option<EncryptionHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ciphertext: Option<String>,
}

/// A decoded session file
#[derive(Debug)]
pub struct Decoded {
    pub session: Session,
    /// Whether the file on disk was encrypted
    pub encrypted: bool,
}

/// Serialize `session` for disk, encrypting when a key is present
pub fn encode(session: &Session, mode: &EncryptionMode) -> Result<Vec<u8>> {
    let envelope = match mode {
        EncryptionMode::Encrypted(key) => {
            let plaintext = serde_json::to_vec(session)?;
            let sealed = crypto::encrypt(&plaintext, key)?;
            Envelope {
                format_version: FORMAT_VERSION,
                encryption: Some(EncryptionHeader {
                    algorithm: crypto::codec::ALGORITHM.to_string(),
                    key_version: key.version(),
                }),
                session: None,
                ciphertext: Some(STANDARD.encode(sealed)),
            }
        }
        EncryptionMode::Plaintext => Envelope {
            format_version: FORMAT_VERSION,
            encryption: None,
            session: Some(session.clone()),
            ciphertext: None,
        },
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

/// Parse a session file. `name` is only used for error messages.
pub fn decode(bytes: &[u8], name: &str, mode: &EncryptionMode) -> Result<Decoded> {
    let corrupted = |reason: String| NexusError::CorruptedSession {
        name: name.to_string(),
        reason,
    };

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| corrupted(format!("invalid JSON: {}", e)))?;

    if value.get("format_version").is_none() {
        let session: Session = serde_json::from_value(value)
            .map_err(|e| corrupted(format!("not a session: {}", e)))?;
        return Ok(Decoded {
            session,
            encrypted: false,
        });
    }

    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| corrupted(format!("malformed envelope: {}", e)))?;
    if envelope.format_version > FORMAT_VERSION {
        return Err(NexusError::UnsupportedFormat(format!(
            "session '{}' uses format version {} (newest supported is {})",
            name, envelope.format_version, FORMAT_VERSION
        )));
    }

    match envelope.encryption {
        None => {
            let session = envelope
                .session
                .ok_or_else(|| corrupted("plaintext envelope has no session".to_string()))?;
            Ok(Decoded {
                session,
                encrypted: false,
            })
        }
        Some(header) => {
            if header.algorithm != crypto::codec::ALGORITHM {
                return Err(NexusError::UnsupportedFormat(format!(
                    "session '{}' is encrypted with '{}'",
                    name, header.algorithm
                )));
            }
            let key = mode.key().ok_or_else(|| {
                NexusError::KeyStoreUnavailable(format!(
                    "session '{}' is encrypted but no encryption key is available",
                    name
                ))
            })?;
            let session = open_sealed(envelope.ciphertext, &header, key, name)?;
            Ok(Decoded {
                session,
                encrypted: true,
            })
        }
    }
}

fn open_sealed(
    ciphertext: Option<String>,
    header: &EncryptionHeader,
    key: &SessionKey,
    name: &str,
) -> Result<Session> {
    let corrupted = |reason: String| NexusError::CorruptedSession {
        name: name.to_string(),
        reason,
    };

    if header.key_version != key.version() {
        return Err(NexusError::AuthenticationFailed(format!(
            "session '{}' was written with key version {}, current key is version {}",
            name,
            header.key_version,
            key.version()
        )));
    }

    let encoded = ciphertext.ok_or_else(|| corrupted("encrypted envelope has no ciphertext".to_string()))?;
    let sealed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| corrupted(format!("ciphertext is not base64: {}", e)))?;

    let plaintext = crypto::decrypt(&sealed, key).map_err(|e| match e {
        NexusError::AuthenticationFailed(reason) => {
            NexusError::AuthenticationFailed(format!("session '{}': {}", name, reason))
        }
        other => other,
    })?;

    serde_json::from_slice(&plaintext).map_err(|e| corrupted(format!("decrypted payload is not a session: {}", e)))
}
