// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Key vaults
//!
//! The session key is owned by the OS credential store. It is created lazily
//! on first use and looked up on every later start. When no backend is
//! reachable the vault fails with `KeyStoreUnavailable`; picking plaintext
//! mode is left to the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keyring::credential::CredentialPersistence;
use rand::RngCore;

use crate::error::{NexusError, Result};

/// Credential store service name
pub const SERVICE_NAME: &str = "nexus-ai-cli";

/// Version tag written next to every encrypted payload
pub const CURRENT_KEY_VERSION: u32 = 1;

/// Environment variable holding an explicit base64 key for headless use
pub const ENV_KEY_VAR: &str = "NEXUS_ENCRYPTION_KEY";

const KEY_LEN: usize = 32;

/// A 256-bit symmetric session key
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
    version: u32,
}

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            bytes,
            version: CURRENT_KEY_VERSION,
        }
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN], version: u32) -> Self {
        Self { bytes, version }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Encode as `<version>:<base64>` for the credential store
    pub fn encode(&self) -> String {
        format!("{}:{}", self.version, BASE64.encode(self.bytes))
    }

    /// Parse `<version>:<base64>`, or a bare base64 key (version 1)
    pub fn decode(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let (version, key) = match encoded.split_once(':') {
            Some((version, key)) => {
                let version = version.parse::<u32>().map_err(|_| {
                    NexusError::KeyStoreUnavailable(format!("invalid key version '{}'", version))
                })?;
                (version, key)
            }
            None => (CURRENT_KEY_VERSION, encoded),
        };

        let raw = BASE64
            .decode(key)
            .map_err(|e| NexusError::KeyStoreUnavailable(format!("stored key is not base64: {}", e)))?;
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            NexusError::KeyStoreUnavailable(format!(
                "stored key has {} bytes, expected {}",
                raw.len(),
                KEY_LEN
            ))
        })?;

        Ok(Self { bytes, version })
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("version", &self.version)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

/// Whether sessions are written encrypted. Plaintext is only ever entered
/// by an explicit caller decision.
#[derive(Debug, Clone)]
pub enum EncryptionMode {
    Encrypted(SessionKey),
    Plaintext,
}

impl EncryptionMode {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, EncryptionMode::Encrypted(_))
    }

    pub fn key(&self) -> Option<&SessionKey> {
        match self {
            EncryptionMode::Encrypted(key) => Some(key),
            EncryptionMode::Plaintext => None,
        }
    }
}

/// Source of the session key
pub trait KeyVault: Send + Sync {
    /// Retrieve the key for `identity`, creating and storing one on first use.
    fn get_or_create_key(&self, identity: &str) -> Result<SessionKey>;

    /// Short label for log output
    fn describe(&self) -> &'static str;
}

/// Account name used for the credential store entry
pub fn account_name(identity: &str) -> String {
    format!("session_key_{}", identity)
}

/// Current OS user, used as the vault identity
pub fn current_identity() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "default".to_string())
}

/// Variant name of a `CredentialPersistence` (keyring does not derive `Debug`)
fn persistence_name(persistence: &CredentialPersistence) -> &'static str {
    match persistence {
        CredentialPersistence::EntryOnly => "EntryOnly",
        CredentialPersistence::ProcessOnly => "ProcessOnly",
        CredentialPersistence::UntilReboot => "UntilReboot",
        CredentialPersistence::UntilDelete => "UntilDelete",
        _ => "Unknown",
    }
}

/// Refuse credential backends that can forget a stored key.
///
/// A key lost on reboot would make every encrypted session unreadable, so
/// such a backend counts as unavailable.
pub fn require_durable(persistence: CredentialPersistence) -> Result<()> {
    if matches!(persistence, CredentialPersistence::UntilDelete) {
        return Ok(());
    }
    Err(NexusError::KeyStoreUnavailable(format!(
        "credential store does not keep keys permanently ({}); set {} instead",
        persistence_name(&persistence), ENV_KEY_VAR
    )))
}

/// OS-native credential store (Keychain, Credential Manager, Secret Service)
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, identity: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &account_name(identity)).map_err(map_keyring_error)
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyVault for KeyringVault {
    fn get_or_create_key(&self, identity: &str) -> Result<SessionKey> {
        require_durable(keyring::default::default_credential_builder().persistence())?;
        let entry = self.entry(identity)?;

        match entry.get_password() {
            Ok(encoded) => {
                tracing::debug!(
                    target: "nexus.crypto.vault",
                    service = %self.service,
                    "loaded session key from credential store"
                );
                SessionKey::decode(&encoded)
            }
            Err(keyring::Error::NoEntry) => {
                let key = SessionKey::generate();
                entry
                    .set_password(&key.encode())
                    .map_err(map_keyring_error)?;
                tracing::info!(
                    target: "nexus.crypto.vault",
                    service = %self.service,
                    "stored new session key in credential store"
                );
                Ok(key)
            }
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn describe(&self) -> &'static str {
        "os-keyring"
    }
}

fn map_keyring_error(err: keyring::Error) -> NexusError {
    NexusError::KeyStoreUnavailable(err.to_string())
}

/// Key supplied explicitly through an environment variable.
///
/// Never creates a key: an unset variable is `KeyStoreUnavailable`.
pub struct EnvVault {
    var: String,
}

impl EnvVault {
    pub fn new() -> Self {
        Self::with_var(ENV_KEY_VAR)
    }

    pub fn with_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvVault {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyVault for EnvVault {
    fn get_or_create_key(&self, _identity: &str) -> Result<SessionKey> {
        let encoded = std::env::var(&self.var)
            .map_err(|_| NexusError::KeyStoreUnavailable(format!("{} is not set", self.var)))?;
        SessionKey::decode(&encoded)
    }

    fn describe(&self) -> &'static str {
        "environment"
    }
}

/// In-process vault for tests and embedding
#[derive(Default)]
pub struct MemoryVault {
    keys: Mutex<HashMap<String, SessionKey>>,
    unavailable: bool,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// A vault that behaves like a headless machine with no backend
    pub fn unavailable() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            unavailable: true,
        }
    }
}

impl KeyVault for MemoryVault {
    fn get_or_create_key(&self, identity: &str) -> Result<SessionKey> {
        if self.unavailable {
            return Err(NexusError::KeyStoreUnavailable(
                "no credential backend".to_string(),
            ));
        }
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| NexusError::KeyStoreUnavailable("vault lock poisoned".to_string()))?;
        Ok(keys
            .entry(identity.to_string())
            .or_insert_with(SessionKey::generate)
            .clone())
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.version(), CURRENT_KEY_VERSION);
    }

    #[test]
    fn test_encode_decode() {
        let key = SessionKey::generate();
        let decoded = SessionKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_decode_bare_base64_defaults_to_v1() {
        let encoded = BASE64.encode([7u8; 32]);
        let key = SessionKey::decode(&encoded).unwrap();
        assert_eq!(key.version(), 1);
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_decode_rejects_short_key() {
        let encoded = format!("1:{}", BASE64.encode([1u8; 16]));
        assert!(matches!(
            SessionKey::decode(&encoded),
            Err(NexusError::KeyStoreUnavailable(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SessionKey::from_bytes([0xAB; 32], 1);
        let debug = format!("{:?}", key);
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_memory_vault_returns_same_key() {
        let vault = MemoryVault::new();
        let first = vault.get_or_create_key("alice").unwrap();
        let second = vault.get_or_create_key("alice").unwrap();
        let other = vault.get_or_create_key("bob").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_unavailable_vault_fails() {
        let vault = MemoryVault::unavailable();
        assert!(matches!(
            vault.get_or_create_key("alice"),
            Err(NexusError::KeyStoreUnavailable(_))
        ));
    }

    #[test]
    fn test_env_vault_missing_variable() {
        let vault = EnvVault::with_var("NEXUS_TEST_KEY_THAT_IS_NEVER_SET");
        assert!(matches!(
            vault.get_or_create_key("alice"),
            Err(NexusError::KeyStoreUnavailable(_))
        ));
    }

    #[test]
    fn test_volatile_backends_are_refused() {
        assert!(require_durable(CredentialPersistence::UntilDelete).is_ok());
        for volatile in [
            CredentialPersistence::UntilReboot,
            CredentialPersistence::ProcessOnly,
            CredentialPersistence::EntryOnly,
        ] {
            assert!(matches!(
                require_durable(volatile),
                Err(NexusError::KeyStoreUnavailable(_))
            ));
        }
    }

    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    #[test]
    fn test_platform_backend_keeps_keys_across_reboots() {
        let persistence = keyring::default::default_credential_builder().persistence();
        assert!(
            matches!(persistence, CredentialPersistence::UntilDelete),
            "default credential store persistence is {}",
            persistence_name(&persistence)
        );
    }

    #[test]
    fn test_account_name() {
        assert_eq!(account_name("alice"), "session_key_alice");
    }

    #[test]
    fn test_encryption_mode() {
        let mode = EncryptionMode::Encrypted(SessionKey::generate());
        assert!(mode.is_encrypted());
        assert!(mode.key().is_some());
        assert!(!EncryptionMode::Plaintext.is_encrypted());
        assert!(EncryptionMode::Plaintext.key().is_none());
    }
}
