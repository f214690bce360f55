//! Passphrase-based key derivation.
//!
//! The vault key is derived from the user's passphrase with
//! PBKDF2-HMAC-SHA256 and a per-vault random salt. The iteration count is
//! fixed and deliberately slow to resist brute force, so derivation runs on
//! the blocking thread pool.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::vault::{VaultError, VaultResult};

/// Salt size in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Derived key size in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// PBKDF2 rounds. Never lower this: existing vaults would stop opening.
pub const PBKDF2_ITERATIONS: u32 = 300_000;

pub type Salt = [u8; SALT_LEN];

/// A user passphrase. The backing buffer is wiped when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// A 256-bit encryption key with automatic zeroization on drop.
///
/// The raw bytes are only reachable from inside this crate, so a host
/// application cannot export the key after the fact.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; KEY_LEN],
}

impl VaultKey {
    pub(crate) fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("VaultKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random salt.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Derive a key synchronously. Prefer [`derive_key`] from async code.
pub fn derive_key_blocking(passphrase: &Passphrase, salt: &[u8]) -> VaultResult<VaultKey> {
    if passphrase.is_empty() {
        return Err(VaultError::InvalidInput("Passphrase must not be empty".into()));
    }
    if salt.len() < SALT_LEN {
        return Err(VaultError::InvalidInput(format!(
            "Salt must be at least {} bytes, got {}",
            SALT_LEN,
            salt.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(
        passphrase.as_str().as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        &mut *key,
    );

    debug!("Derived {}-byte key from passphrase", KEY_LEN);
    Ok(VaultKey::from_bytes(*key))
}

/// Derive a key on the blocking pool. The passphrase is consumed and wiped
/// when derivation finishes, whether it succeeded or not.
pub async fn derive_key(passphrase: Passphrase, salt: &[u8]) -> VaultResult<VaultKey> {
    let salt = salt.to_vec();
    tokio::task::spawn_blocking(move || derive_key_blocking(&passphrase, &salt))
        .await
        .map_err(|e| VaultError::Encryption(format!("Key derivation task failed: {}", e)))?
}
