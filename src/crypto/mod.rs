// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session encryption
//!
//! - `vault`: where the symmetric key lives (OS credential store, explicit
//!   environment key, or in-memory for tests)
//! - `codec`: AES-256-GCM authenticated encryption of session payloads

pub mod codec;
pub mod vault;

pub use codec::{decrypt, encrypt};
pub use vault::{
    EncryptionMode, EnvVault, KeyVault, KeyringVault, MemoryVault, SessionKey, CURRENT_KEY_VERSION,
    SERVICE_NAME,
};
