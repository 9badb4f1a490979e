//! Conversion between vault snapshots and stored bytes
//!
//! A plain vault stores the snapshot as a UTF-8 JSON array. A sealed vault
//! wraps that same JSON in an [`EncryptedVault`] envelope.

use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::crypto::{compute_checksum, generate_salt, verify_checksum, DerivedKey, SALT_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::models::{CredentialEntry, EncryptedVault, VaultConfig, VaultSnapshot};

/// How a snapshot is written to and read from storage
pub enum SnapshotCodec {
    /// Plain JSON array of entries
    Plain,
    /// JSON encrypted under a passphrase-derived key
    Sealed(Sealer),
}

impl SnapshotCodec {
    pub fn plain() -> Self {
        SnapshotCodec::Plain
    }

    pub fn sealed(passphrase: SecretString, config: &VaultConfig) -> Self {
        SnapshotCodec::Sealed(Sealer::new(passphrase, config.clone()))
    }

    /// Serialize the whole snapshot into the bytes to store
    pub fn encode(&self, snapshot: &VaultSnapshot) -> VaultResult<Vec<u8>> {
        let json = serde_json::to_vec(snapshot)
            .map_err(|e| VaultError::CorruptData(e.to_string()))?;

        match self {
            SnapshotCodec::Plain => Ok(json),
            SnapshotCodec::Sealed(sealer) => sealer.seal(&json),
        }
    }

    /// Parse stored bytes back into a snapshot
    pub fn decode(&self, bytes: &[u8]) -> VaultResult<VaultSnapshot> {
        match self {
            SnapshotCodec::Plain => parse_snapshot(bytes),
            SnapshotCodec::Sealed(sealer) => {
                let json = sealer.open(bytes)?;
                parse_snapshot(&json)
            }
        }
    }
}

impl std::fmt::Debug for SnapshotCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotCodec::Plain => f.write_str("Plain"),
            SnapshotCodec::Sealed(_) => f.write_str("Sealed"),
        }
    }
}

/// Decode the JSON wire format, treating anything but an array of
/// well-formed entries with distinct ids as corrupt.
fn parse_snapshot(bytes: &[u8]) -> VaultResult<VaultSnapshot> {
    let entries: Vec<CredentialEntry> =
        serde_json::from_slice(bytes).map_err(|e| VaultError::CorruptData(e.to_string()))?;

    VaultSnapshot::from_entries(entries).map_err(|e| match e {
        VaultError::DuplicateId(id) => {
            VaultError::CorruptData(format!("duplicate entry id {}", id))
        }
        other => other,
    })
}

/// Passphrase holder for sealed vaults.
///
/// Argon2 is expensive, so the key for the vault's salt is cached after
/// the first derivation. The salt is created once and reused on every
/// rewrite of the same vault.
pub struct Sealer {
    passphrase: SecretString,
    config: VaultConfig,
    cached: Mutex<Option<([u8; SALT_SIZE], Arc<DerivedKey>)>>,
}

impl Sealer {
    fn new(passphrase: SecretString, config: VaultConfig) -> Self {
        Self {
            passphrase,
            config,
            cached: Mutex::new(None),
        }
    }

    fn cached_key(&self) -> Option<([u8; SALT_SIZE], Arc<DerivedKey>)> {
        let guard = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().map(|(salt, key)| (*salt, Arc::clone(key)))
    }

    fn remember(&self, salt: [u8; SALT_SIZE], key: Arc<DerivedKey>) {
        let mut guard = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some((salt, key));
    }

    fn derive(&self, salt: &[u8; SALT_SIZE]) -> VaultResult<Arc<DerivedKey>> {
        debug!("deriving vault key");
        let key = DerivedKey::derive(self.passphrase.expose_secret().as_bytes(), salt, &self.config)?;
        Ok(Arc::new(key))
    }

    fn seal(&self, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        let (salt, key) = match self.cached_key() {
            Some(cached) => cached,
            None => {
                let salt = generate_salt();
                let key = self.derive(&salt)?;
                self.remember(salt, Arc::clone(&key));
                (salt, key)
            }
        };

        let checksum = compute_checksum(plaintext);
        let (ciphertext, nonce) = key.encrypt(plaintext)?;

        let envelope = EncryptedVault {
            version: EncryptedVault::CURRENT_VERSION,
            salt,
            nonce,
            ciphertext,
            checksum,
        };

        serde_json::to_vec(&envelope).map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    fn open(&self, bytes: &[u8]) -> VaultResult<Vec<u8>> {
        let envelope: EncryptedVault = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::CorruptData(format!("not a sealed vault: {}", e)))?;

        if envelope.version > EncryptedVault::CURRENT_VERSION {
            return Err(VaultError::CorruptData(format!(
                "vault version {} is newer than supported version {}",
                envelope.version,
                EncryptedVault::CURRENT_VERSION
            )));
        }

        let key = match self.cached_key() {
            Some((salt, key)) if salt == envelope.salt => key,
            _ => self.derive(&envelope.salt)?,
        };

        let plaintext = key.decrypt(&envelope.ciphertext, &envelope.nonce)?;

        if !verify_checksum(&plaintext, &envelope.checksum) {
            return Err(VaultError::CorruptData("checksum mismatch".to_string()));
        }

        self.remember(envelope.salt, key);
        Ok(plaintext)
    }
}
