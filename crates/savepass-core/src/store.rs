//! The vault store: owns the single storage slot holding every entry
//!
//! Every mutation reloads the stored snapshot, applies the change and
//! writes the whole snapshot back under [`VAULT_KEY`]. Mutations are
//! serialized by a single-writer lock so concurrent callers never lose
//! each other's changes.

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::SnapshotCodec;
use crate::error::{VaultError, VaultResult};
use crate::models::{CredentialEntry, VaultSnapshot};
use crate::storage::KeyValueStorage;

/// Storage key for the whole vault
pub const VAULT_KEY: &str = "@savepass:logins";

pub struct VaultStore<S> {
    storage: S,
    codec: SnapshotCodec,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStorage> VaultStore<S> {
    /// Store that keeps the snapshot as plain JSON
    pub fn new(storage: S) -> Self {
        Self::with_codec(storage, SnapshotCodec::plain())
    }

    pub fn with_codec(storage: S, codec: SnapshotCodec) -> Self {
        Self {
            storage,
            codec,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the current snapshot. A missing value is an empty vault; a
    /// value that cannot be decoded is reported, never replaced by an
    /// empty list.
    pub async fn load(&self) -> VaultResult<VaultSnapshot> {
        let raw = match self.storage.get(VAULT_KEY).await? {
            Some(raw) => raw,
            None => {
                debug!("no stored vault, starting empty");
                return Ok(VaultSnapshot::new());
            }
        };

        match self.codec.decode(&raw) {
            Ok(snapshot) => {
                debug!(entries = snapshot.len(), "loaded vault");
                Ok(snapshot)
            }
            Err(e) => {
                warn!("failed to decode stored vault: {}", e);
                Err(e)
            }
        }
    }

    /// Write an empty snapshot into an unused slot. For a sealed vault this
    /// fixes the passphrase every later open is checked against.
    pub async fn create(&self) -> VaultResult<()> {
        let _guard = self.write_lock.lock().await;

        if self.storage.get(VAULT_KEY).await?.is_some() {
            return Err(VaultError::ConfigError("a vault already exists".to_string()));
        }

        self.persist(&VaultSnapshot::new()).await?;
        info!("created empty vault");
        Ok(())
    }

    /// Insert a new entry at the head of the vault
    pub async fn append(&self, entry: CredentialEntry) -> VaultResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.load().await?;
        let id = entry.id.clone();
        if let Err(e) = snapshot.prepend(entry) {
            warn!(id = %id, "rejected append with existing id");
            return Err(e);
        }

        self.persist(&snapshot).await?;
        info!(id = %id, entries = snapshot.len(), "appended entry");
        Ok(())
    }

    /// Replace the entry with the same id, keeping its position
    pub async fn update(&self, entry: CredentialEntry) -> VaultResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.load().await?;
        let id = entry.id.clone();
        snapshot.replace(entry)?;

        self.persist(&snapshot).await?;
        info!(id = %id, "updated entry");
        Ok(())
    }

    /// Remove an entry. Returns `false`, without writing, if it was absent.
    pub async fn delete(&self, id: &str) -> VaultResult<bool> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.load().await?;
        if !snapshot.remove(id) {
            debug!(id = %id, "delete of unknown entry");
            return Ok(false);
        }

        self.persist(&snapshot).await?;
        info!(id = %id, entries = snapshot.len(), "deleted entry");
        Ok(true)
    }

    /// Encode fully before touching storage so a failure never leaves a
    /// partial value behind.
    async fn persist(&self, snapshot: &VaultSnapshot) -> VaultResult<()> {
        let bytes = self.codec.encode(snapshot)?;
        self.storage.set(VAULT_KEY, &bytes).await.map_err(|e| {
            warn!("failed to persist vault: {}", e);
            match e {
                VaultError::StorageUnavailable(_) => e,
                other => VaultError::StorageUnavailable(other.to_string()),
            }
        })
    }
}
