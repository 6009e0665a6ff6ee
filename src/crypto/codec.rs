// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! AES-256-GCM payload encryption
//!
//! Output layout: 12-byte random nonce followed by ciphertext and 16-byte tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::crypto::vault::SessionKey;
use crate::error::{NexusError, Result};

/// Algorithm identifier recorded in session file headers
pub const ALGORITHM: &str = "aes-256-gcm";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

fn cipher(key: &SessionKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| NexusError::InvalidInput("session key has invalid length".to_string()))
}

/// Encrypt `plaintext` under `key` with a fresh nonce.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| NexusError::InvalidInput("payload could not be encrypted".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt and authenticate. Any tampering or a wrong key fails with
/// `AuthenticationFailed`; corrupted plaintext is never returned.
pub fn decrypt(ciphertext: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(NexusError::AuthenticationFailed(
            "ciphertext is truncated".to_string(),
        ));
    }

    let (nonce, body) = ciphertext.split_at(NONCE_LEN);
    cipher(key)?
        .decrypt(Nonce::from_slice(nonce), body)
        .map_err(|_| NexusError::AuthenticationFailed("tag mismatch".to_string()))
}
