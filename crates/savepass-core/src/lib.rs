//! SavePass Core - Local credential vault
//!
//! This crate provides:
//! - Durable storage of credential entries under a single storage key
//! - Newest-first ordering with atomic whole-vault rewrites
//! - Case-insensitive search over service names and logins
//! - Optional passphrase sealing (Argon2id + AES-256-GCM)

pub mod models;
pub mod crypto;
pub mod codec;
pub mod storage;
pub mod store;
pub mod search;
pub mod vault;
pub mod error;

pub use models::*;
pub use codec::SnapshotCodec;
pub use storage::*;
pub use store::*;
pub use search::filter;
pub use vault::*;
pub use error::*;
