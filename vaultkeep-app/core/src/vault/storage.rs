//! Persisted vault records.
//!
//! This module provides:
//! - `StoredEnvelope`: the sealed vault plus the salt it was derived with
//! - helpers to read/write the envelope and the advisory session marker
//!
//! Byte fields serialize as JSON number arrays, matching the format older
//! vaults were written in.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::security::Envelope;
use crate::storage::{KeyValueStore, SESSION_EXPIRY_KEY, VAULT_KEY};
use crate::vault::{VaultError, VaultResult};

/// The on-store representation of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    pub salt: Vec<u8>,
    pub data: Envelope,
    pub timestamp: i64,
}

/// Check if a vault record exists.
pub fn vault_exists(store: &dyn KeyValueStore) -> VaultResult<bool> {
    store.contains(VAULT_KEY)
}

/// Load the stored envelope.
///
/// An unparseable record is reported as `AuthFailure`, the same as a wrong
/// passphrase, so callers cannot tell corruption from a bad guess.
pub fn read_envelope(store: &dyn KeyValueStore) -> VaultResult<Option<StoredEnvelope>> {
    let Some(raw) = store.get(VAULT_KEY)? else {
        return Ok(None);
    };

    serde_json::from_str(&raw).map(Some).map_err(|e| {
        warn!("Stored vault record could not be parsed: {}", e);
        VaultError::AuthFailure
    })
}

pub fn write_envelope(store: &dyn KeyValueStore, record: &StoredEnvelope) -> VaultResult<()> {
    let raw = serde_json::to_string(record)?;
    store.set(VAULT_KEY, &raw)
}

pub fn delete_envelope(store: &dyn KeyValueStore) -> VaultResult<()> {
    store.remove(VAULT_KEY)
}

/// Read the advisory session expiry. Malformed markers read as absent.
pub fn read_session_marker(store: &dyn KeyValueStore) -> VaultResult<Option<i64>> {
    Ok(store
        .get(SESSION_EXPIRY_KEY)?
        .and_then(|raw| raw.trim().parse::<i64>().ok()))
}

pub fn write_session_marker(store: &dyn KeyValueStore, expiry_ms: i64) -> VaultResult<()> {
    store.set(SESSION_EXPIRY_KEY, &expiry_ms.to_string())
}

pub fn clear_session_marker(store: &dyn KeyValueStore) -> VaultResult<()> {
    store.remove(SESSION_EXPIRY_KEY)
}
