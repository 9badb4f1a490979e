//! Caller-facing vault interface
//!
//! Wraps a [`VaultStore`] with id generation and search, and knows how to
//! open a file-backed vault from its directory and config.

use secrecy::SecretString;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::codec::SnapshotCodec;
use crate::error::{VaultError, VaultResult};
use crate::models::{CredentialEntry, VaultConfig, VaultSnapshot};
use crate::search;
use crate::storage::{self, FileStorage, KeyValueStorage};
use crate::store::{VaultStore, VAULT_KEY};

/// Source of collision-resistant entry ids
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random UUID v4 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

pub struct Vault<S, G = UuidGenerator> {
    store: VaultStore<S>,
    ids: G,
}

impl<S: KeyValueStorage> Vault<S> {
    pub fn new(store: VaultStore<S>) -> Self {
        Self::with_id_generator(store, UuidGenerator)
    }
}

impl Vault<FileStorage> {
    /// Open the vault in `base_dir` using its saved config.
    ///
    /// A sealed vault needs the passphrase and is decrypted once here, so a
    /// wrong passphrase fails with `InvalidPassphrase` before any command
    /// runs. A plain vault ignores the passphrase.
    pub async fn open(base_dir: &Path, passphrase: Option<SecretString>) -> VaultResult<Self> {
        let config = storage::load_config(base_dir).await?;
        let codec = codec_for(&config, passphrase)?;
        let store = VaultStore::with_codec(FileStorage::new(base_dir), codec);

        if config.sealed {
            if store.storage().get(VAULT_KEY).await?.is_none() {
                return Err(VaultError::ConfigError(format!(
                    "sealed vault at {} holds no data; run init again",
                    base_dir.display()
                )));
            }
            store.load().await?;
        }

        Ok(Self::new(store))
    }

    /// Create a new vault in `base_dir`: an empty snapshot, then its config.
    ///
    /// A sealed vault is written with `passphrase` right away, so that
    /// passphrase is the one every later open must match. Refuses to run
    /// over a vault that already holds data.
    pub async fn init(
        base_dir: &Path,
        config: &VaultConfig,
        passphrase: Option<SecretString>,
    ) -> VaultResult<()> {
        let codec = codec_for(config, passphrase)?;
        let store = VaultStore::with_codec(FileStorage::new(base_dir), codec);
        store.create().await.map_err(|e| match e {
            VaultError::ConfigError(_) => VaultError::ConfigError(format!(
                "a vault already exists at {}",
                base_dir.display()
            )),
            other => other,
        })?;

        storage::save_config(base_dir, config).await?;
        info!(sealed = config.sealed, "initialized vault at {}", base_dir.display());
        Ok(())
    }
}

fn codec_for(config: &VaultConfig, passphrase: Option<SecretString>) -> VaultResult<SnapshotCodec> {
    if !config.sealed {
        return Ok(SnapshotCodec::plain());
    }
    passphrase
        .map(|p| SnapshotCodec::sealed(p, config))
        .ok_or_else(|| VaultError::ConfigError("vault is sealed; a passphrase is required".to_string()))
}

impl<S: KeyValueStorage, G: IdGenerator> Vault<S, G> {
    pub fn with_id_generator(store: VaultStore<S>, ids: G) -> Self {
        Self { store, ids }
    }

    pub fn store(&self) -> &VaultStore<S> {
        &self.store
    }

    /// Every entry, newest first
    pub async fn list_entries(&self) -> VaultResult<VaultSnapshot> {
        self.store.load().await
    }

    /// Create and persist a new entry, returning it with its generated id.
    ///
    /// Inputs are expected to be validated by the caller.
    pub async fn add_entry(
        &self,
        service_name: &str,
        login: &str,
        secret: &str,
    ) -> VaultResult<CredentialEntry> {
        let entry = CredentialEntry::new(self.ids.generate(), service_name, login, secret);
        self.store.append(entry.clone()).await?;
        Ok(entry)
    }

    /// Filter a snapshot by a free-text query
    pub fn search(&self, snapshot: &VaultSnapshot, query: &str) -> VaultSnapshot {
        search::filter(snapshot, query)
    }

    /// Replace the fields of an existing entry, keeping its id
    pub async fn update_entry(
        &self,
        id: &str,
        service_name: &str,
        login: &str,
        secret: &str,
    ) -> VaultResult<CredentialEntry> {
        let entry = CredentialEntry::new(id, service_name, login, secret);
        self.store.update(entry.clone()).await?;
        Ok(entry)
    }

    /// Remove an entry; `false` if no entry had that id
    pub async fn delete_entry(&self, id: &str) -> VaultResult<bool> {
        self.store.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_config;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Hands out the same id every time
    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn generate(&self) -> String {
            "fixed".to_string()
        }
    }

    struct CountingIds(AtomicUsize);

    impl IdGenerator for CountingIds {
        fn generate(&self) -> String {
            format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn memory_vault() -> Vault<MemoryStorage> {
        Vault::new(VaultStore::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_add_entry_generates_unique_ids() {
        let vault = memory_vault();
        let a = vault.add_entry("GitHub", "dev@example.com", "pw1").await.unwrap();
        let b = vault.add_entry("GitHub", "dev@example.com", "pw1").await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());

        let listed = vault.list_entries().await.unwrap();
        assert_eq!(listed.entries(), &[b, a]);
    }

    #[tokio::test]
    async fn test_colliding_generator_is_rejected() {
        let vault = Vault::with_id_generator(VaultStore::new(MemoryStorage::new()), FixedIds);
        vault.add_entry("a", "a@b.c", "x").await.unwrap();

        assert!(matches!(
            vault.add_entry("b", "b@b.c", "y").await,
            Err(VaultError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn test_search_over_listed_entries() {
        let vault = Vault::with_id_generator(
            VaultStore::new(MemoryStorage::new()),
            CountingIds(AtomicUsize::new(0)),
        );
        vault.add_entry("GitHub", "dev@example.com", "x").await.unwrap();
        vault.add_entry("Bank", "me@example.com", "gitSecret123").await.unwrap();
        vault.add_entry("GitLab", "ops@example.com", "y").await.unwrap();

        let all = vault.list_entries().await.unwrap();
        let found = vault.search(&all, "GIT");

        let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["id-2", "id-0"]);
        assert_eq!(vault.search(&all, ""), all);
    }

    #[tokio::test]
    async fn test_update_and_delete_entry() {
        let vault = memory_vault();
        let created = vault.add_entry("GitHub", "dev@example.com", "old").await.unwrap();

        let updated = vault
            .update_entry(&created.id, "GitHub", "dev@example.com", "new")
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(vault.list_entries().await.unwrap().entries()[0].secret, "new");

        assert!(vault.delete_entry(&created.id).await.unwrap());
        assert!(vault.list_entries().await.unwrap().is_empty());
        assert!(!vault.delete_entry(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_plain_file_vault() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("vault");

        Vault::init(&dir, &VaultConfig::default(), None).await.unwrap();
        let vault = Vault::open(&dir, None).await.unwrap();
        let created = vault.add_entry("GitHub", "dev@example.com", "pw").await.unwrap();

        // Reopen from disk
        let reopened = Vault::open(&dir, None).await.unwrap();
        assert_eq!(reopened.list_entries().await.unwrap().entries(), &[created]);

        let raw = std::fs::read_to_string(
            reopened.store().storage().key_path(VAULT_KEY),
        )
        .unwrap();
        assert!(raw.contains("\"email\":\"dev@example.com\""));
    }

    #[tokio::test]
    async fn test_init_refuses_existing_vault() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        Vault::init(dir, &VaultConfig::default(), None).await.unwrap();
        assert!(matches!(
            Vault::init(dir, &VaultConfig::default(), None).await,
            Err(VaultError::ConfigError(_))
        ));

        let vault = Vault::open(dir, None).await.unwrap();
        vault.add_entry("a", "a@b.c", "x").await.unwrap();

        // A refused sealed init must leave the plain vault readable
        let pass = Some(SecretString::new("correct horse".to_string()));
        assert!(matches!(
            Vault::init(dir, &test_config(), pass).await,
            Err(VaultError::ConfigError(_))
        ));
        assert_eq!(Vault::open(dir, None).await.unwrap().list_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sealed_init_requires_passphrase() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        assert!(matches!(
            Vault::init(dir, &test_config(), None).await,
            Err(VaultError::ConfigError(_))
        ));
        assert!(!storage::config_file_path(dir).exists());
    }

    #[tokio::test]
    async fn test_sealed_init_fixes_passphrase() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let chosen = || Some(SecretString::new("correct horse".to_string()));

        Vault::init(dir, &test_config(), chosen()).await.unwrap();

        // Opening with a near miss must fail before anything is written
        let typo = Some(SecretString::new("correct horsf".to_string()));
        assert!(matches!(
            Vault::open(dir, typo).await,
            Err(VaultError::InvalidPassphrase)
        ));

        let vault = Vault::open(dir, chosen()).await.unwrap();
        assert!(vault.list_entries().await.unwrap().is_empty());
        vault.add_entry("Bank", "me@example.com", "s3cret").await.unwrap();
        assert_eq!(
            Vault::open(dir, chosen()).await.unwrap().list_entries().await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_open_sealed_file_vault() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let pass = || Some(SecretString::new("correct horse".to_string()));
        Vault::init(dir, &test_config(), pass()).await.unwrap();

        assert!(matches!(
            Vault::open(dir, None).await,
            Err(VaultError::ConfigError(_))
        ));

        let vault = Vault::open(dir, pass()).await.unwrap();
        vault.add_entry("Bank", "me@example.com", "s3cret").await.unwrap();

        let reopened = Vault::open(dir, pass()).await.unwrap();
        assert_eq!(reopened.list_entries().await.unwrap().len(), 1);

        assert!(matches!(
            Vault::open(dir, Some(SecretString::new("nope".to_string()))).await,
            Err(VaultError::InvalidPassphrase)
        ));

        // Config saying sealed with no stored data cannot be checked
        std::fs::remove_file(reopened.store().storage().key_path(VAULT_KEY)).unwrap();
        assert!(matches!(
            Vault::open(dir, pass()).await,
            Err(VaultError::ConfigError(_))
        ));
    }
}
