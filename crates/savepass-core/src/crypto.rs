//! Cryptographic operations for sealed vaults
//!
//! - AES-256-GCM for the stored snapshot
//! - Argon2id for passphrase-based key derivation
//! - Secure memory handling with zeroization

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{VaultError, VaultResult};
use crate::models::VaultConfig;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of Argon2 salt in bytes
pub const SALT_SIZE: usize = 32;

/// Snapshot encryption key derived from the vault passphrase
pub struct DerivedKey {
    key: Secret<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Derive the key from a passphrase using Argon2id with the configured cost
    pub fn derive(passphrase: &[u8], salt: &[u8; SALT_SIZE], config: &VaultConfig) -> VaultResult<Self> {
        let params = Params::new(
            config.argon2_memory_kb,
            config.argon2_iterations,
            config.argon2_parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let mut output = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(passphrase, salt, &mut output)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

        let key = Secret::new(output);
        output.zeroize();

        Ok(Self { key })
    }

    /// Encrypt data with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<(Vec<u8>, [u8; NONCE_SIZE])> {
        let cipher = Aes256Gcm::new_from_slice(self.key.expose_secret())
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;

        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;

        Ok((ciphertext, nonce_bytes))
    }

    /// Decrypt data; any authentication failure means a wrong passphrase or tampering
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> VaultResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(self.key.expose_secret())
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(nonce);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::InvalidPassphrase)
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Compute SHA-256 checksum of data
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Verify SHA-256 checksum
pub fn verify_checksum(data: &[u8], expected: &[u8; 32]) -> bool {
    let computed = compute_checksum(data);
    constant_time_compare(&computed, expected)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
pub(crate) fn test_config() -> VaultConfig {
    VaultConfig {
        sealed: true,
        argon2_memory_kb: 1024,
        argon2_iterations: 1,
        argon2_parallelism: 1,
    }
}
