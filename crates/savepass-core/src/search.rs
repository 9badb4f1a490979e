//! Query filtering over a vault snapshot
//!
//! Matches are case-insensitive substrings of the service name or the
//! login. Secrets are never searched, and results keep snapshot order.

use crate::models::{CredentialEntry, VaultSnapshot};

/// Return the entries matching `query`, in snapshot order.
///
/// Surrounding whitespace in the query is ignored; a blank query returns
/// the whole snapshot.
pub fn filter(snapshot: &VaultSnapshot, query: &str) -> VaultSnapshot {
    let query = query.trim();
    if query.is_empty() {
        return snapshot.clone();
    }

    let needle = query.to_lowercase();
    snapshot
        .iter()
        .filter(|entry| matches(entry, &needle))
        .cloned()
        .collect()
}

/// `needle` must already be lowercased
fn matches(entry: &CredentialEntry, needle: &str) -> bool {
    entry.service_name.to_lowercase().contains(needle) || entry.login.to_lowercase().contains(needle)
}
