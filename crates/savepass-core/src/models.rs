//! Data models for credential entries and vault configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{VaultError, VaultResult};

/// A single saved credential.
///
/// The serialized field names (`id`, `service_name`, `email`, `password`)
/// are the persisted wire format and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialEntry {
    /// Unique identifier, assigned once at creation
    pub id: String,

    /// Label for where the credential is used (e.g., "GitHub")
    pub service_name: String,

    /// Account identifier, usually an email address
    #[serde(rename = "email")]
    pub login: String,

    /// The password itself, stored as given
    #[serde(rename = "password")]
    pub secret: String,
}

impl CredentialEntry {
    /// Create an entry with a caller-supplied id
    pub fn new(
        id: impl Into<String>,
        service_name: impl Into<String>,
        login: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            login: login.into(),
            secret: secret.into(),
        }
    }
}

/// Ordered view of every entry in the vault, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VaultSnapshot {
    entries: Vec<CredentialEntry>,
}

impl VaultSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot, rejecting duplicate ids
    pub fn from_entries(entries: Vec<CredentialEntry>) -> VaultResult<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(VaultError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CredentialEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CredentialEntry> {
        self.entries.iter()
    }

    /// Find entry by ID
    pub fn find_by_id(&self, id: &str) -> Option<&CredentialEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Check if an id is already taken
    pub fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Insert at the head (newest first)
    pub(crate) fn prepend(&mut self, entry: CredentialEntry) -> VaultResult<()> {
        if self.contains_id(&entry.id) {
            return Err(VaultError::DuplicateId(entry.id));
        }
        self.entries.insert(0, entry);
        Ok(())
    }

    /// Swap in a new version of an entry, keeping its position
    pub(crate) fn replace(&mut self, entry: CredentialEntry) -> VaultResult<()> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| VaultError::EntryNotFound(entry.id.clone()))?;
        *slot = entry;
        Ok(())
    }

    /// Remove an entry, returning whether it was present
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }
}

impl<'a> IntoIterator for &'a VaultSnapshot {
    type Item = &'a CredentialEntry;
    type IntoIter = std::slice::Iter<'a, CredentialEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<CredentialEntry> for VaultSnapshot {
    /// Collect already-validated entries, e.g. a filtered subsequence
    fn from_iter<I: IntoIterator<Item = CredentialEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Sealed vault envelope (stored format when encryption is enabled)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedVault {
    /// Schema version for migrations
    pub version: u32,

    /// Argon2 salt (32 bytes)
    pub salt: [u8; 32],

    /// AES-GCM nonce (12 bytes)
    pub nonce: [u8; 12],

    /// Encrypted snapshot JSON
    pub ciphertext: Vec<u8>,

    /// SHA-256 checksum of plaintext for integrity
    pub checksum: [u8; 32],
}

impl EncryptedVault {
    pub const CURRENT_VERSION: u32 = 1;
}

/// Vault configuration (non-sensitive, stored in plaintext)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Encrypt the stored snapshot with a passphrase
    pub sealed: bool,

    /// Argon2 memory cost in KB
    pub argon2_memory_kb: u32,

    /// Argon2 iterations
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            sealed: false,
            argon2_memory_kb: 65536, // 64 MB
            argon2_iterations: 3,
            argon2_parallelism: 4,
        }
    }
}
