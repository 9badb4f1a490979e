//! Durable key-value storage for vault data
//!
//! The vault persists through the [`KeyValueStorage`] trait:
//! - [`FileStorage`] keeps one file per key, with atomic writes (write to
//!   temp, then rename) and a backup of the previous value
//! - [`MemoryStorage`] keeps values in a map, for tests and embedding

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{VaultError, VaultResult};
use crate::models::VaultConfig;

/// Default vault directory name
const VAULT_DIR: &str = ".savepass";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Byte-oriented storage provider.
///
/// `set` must replace the value wholesale: a reader sees either the old
/// bytes or the new ones, never a mix.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read the value for a key, `None` if it was never written
    async fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>>;

    /// Replace the value for a key
    async fn set(&self, key: &str, value: &[u8]) -> VaultResult<()>;
}

/// Get the default vault directory path
pub fn default_vault_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(VAULT_DIR)
}

/// Get the config file path
pub fn config_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE)
}

/// Ensure the vault directory exists and is restricted to the owner,
/// tightening a directory that was created elsewhere with wider access
pub async fn ensure_vault_dir(base_dir: &Path) -> VaultResult<()> {
    if !base_dir.exists() {
        fs::create_dir_all(base_dir).await?;
    }

    // Set directory permissions to 700 (owner only) on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let current = fs::metadata(base_dir).await?.permissions().mode() & 0o777;
        if current != 0o700 {
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_dir, perms).await?;
        }
    }
    Ok(())
}

/// Load vault configuration, falling back to defaults when absent
pub async fn load_config(base_dir: &Path) -> VaultResult<VaultConfig> {
    let config_path = config_file_path(base_dir);

    if !config_path.exists() {
        return Ok(VaultConfig::default());
    }

    let content = fs::read_to_string(&config_path).await?;
    let config: VaultConfig = toml::from_str(&content)
        .map_err(|e| VaultError::ConfigError(e.to_string()))?;

    Ok(config)
}

/// Save vault configuration
pub async fn save_config(base_dir: &Path, config: &VaultConfig) -> VaultResult<()> {
    ensure_vault_dir(base_dir).await?;

    let config_path = config_file_path(base_dir);
    let content = toml::to_string_pretty(config)
        .map_err(|e| VaultError::ConfigError(e.to_string()))?;

    fs::write(&config_path, content).await?;

    Ok(())
}

/// File-backed storage: each key is a JSON file in the vault directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file holding a key's value.
    ///
    /// Characters outside `[A-Za-z0-9._-]` become `_`, so the mapping is
    /// lossy: `@a:b` and `_a_b` share a file. Keys must differ after
    /// sanitizing to be stored apart; the vault only ever uses one key.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(format!("{}.json", name))
    }

    /// Path of the backup taken before each overwrite
    pub fn backup_path(&self, key: &str) -> PathBuf {
        self.key_path(key).with_extension("json.backup")
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.key_path(key).with_extension("json.tmp")
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> VaultResult<()> {
        ensure_vault_dir(&self.base_dir).await?;

        let path = self.key_path(key);

        // Keep a copy of the previous value
        if path.exists() {
            fs::copy(&path, self.backup_path(key)).await?;
        }

        // Write atomically (write to temp, then rename)
        let temp_path = self.temp_path(key);
        write_private_file(&temp_path, value).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }
}

/// Write a file that is owner-only from the moment it exists, then flush
/// it to disk
async fn write_private_file(path: &Path, data: &[u8]) -> VaultResult<()> {
    // A leftover temp file keeps its old mode through a truncating open
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;

    Ok(())
}

/// In-memory storage. Reads and writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with `StorageUnavailable`
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail with `StorageUnavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VaultError::StorageUnavailable("read refused".to_string()));
        }
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> VaultResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::StorageUnavailable("write refused".to_string()));
        }
        self.values.lock().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_path_is_sanitized() {
        let storage = FileStorage::new("/tmp/vault");
        assert_eq!(
            storage.key_path("@savepass:logins"),
            PathBuf::from("/tmp/vault/_savepass_logins.json")
        );
    }

    #[tokio::test]
    async fn test_keys_equal_after_sanitizing_share_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        assert_eq!(storage.key_path("@a:b"), storage.key_path("_a_b"));

        storage.set("@a:b", b"first").await.unwrap();
        storage.set("_a_b", b"second").await.unwrap();
        assert_eq!(storage.get("@a:b").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_file_get_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("vault"));

        assert_eq!(storage.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_set_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("vault"));

        storage.set("k", b"first").await.unwrap();
        storage.set("k", b"second").await.unwrap();

        assert_eq!(storage.get("k").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(std::fs::read(storage.backup_path("k")).unwrap(), b"first");
        assert!(!storage.temp_path("k").exists());

        // A fresh instance over the same directory sees the value
        let reopened = FileStorage::new(storage.base_dir());
        assert_eq!(reopened.get("k").await.unwrap(), Some(b"second".to_vec()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("vault"));
        storage.set("k", b"v").await.unwrap();

        let dir_mode = std::fs::metadata(storage.base_dir()).unwrap().permissions().mode();
        let file_mode = std::fs::metadata(storage.key_path("k")).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_dir_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let base_dir = temp_dir.path().join("vault");
        std::fs::create_dir(&base_dir).unwrap();
        std::fs::set_permissions(&base_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        FileStorage::new(&base_dir).set("k", b"v").await.unwrap();

        let mode = std::fs::metadata(&base_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_temp_file_does_not_widen_value() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        ensure_vault_dir(storage.base_dir()).await.unwrap();

        let temp_path = storage.temp_path("k");
        std::fs::write(&temp_path, b"leftover").unwrap();
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o644)).unwrap();

        storage.set("k", b"v").await.unwrap();

        let mode = std::fs::metadata(storage.key_path("k")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(storage.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn test_file_read_error_is_storage_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        // A directory where the value file should be cannot be read
        std::fs::create_dir(storage.key_path("k")).unwrap();
        assert!(matches!(
            storage.get("k").await,
            Err(VaultError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_failure_switches() {
        let storage = MemoryStorage::new();
        storage.set("k", b"v").await.unwrap();

        storage.set_fail_writes(true);
        assert!(matches!(
            storage.set("k", b"other").await,
            Err(VaultError::StorageUnavailable(_))
        ));
        assert_eq!(storage.get("k").await.unwrap(), Some(b"v".to_vec()));

        storage.set_fail_reads(true);
        assert!(storage.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let base_dir = temp_dir.path().join("vault");

        assert_eq!(load_config(&base_dir).await.unwrap(), VaultConfig::default());

        let config = VaultConfig {
            sealed: true,
            ..VaultConfig::default()
        };
        save_config(&base_dir, &config).await.unwrap();
        assert_eq!(load_config(&base_dir).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_invalid_config_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(config_file_path(temp_dir.path()), "sealed = \"maybe\"").unwrap();

        assert!(matches!(
            load_config(temp_dir.path()).await,
            Err(VaultError::ConfigError(_))
        ));
    }
}
