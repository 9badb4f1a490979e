//! Error types for vault operations

use thiserror::Error;

/// Errors that can occur during vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Vault data is corrupted: {0}")]
    CorruptData(String),

    #[error("Entry id already exists: {0}")]
    DuplicateId(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid passphrase or tampered vault")]
    InvalidPassphrase,

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::StorageUnavailable(err.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
