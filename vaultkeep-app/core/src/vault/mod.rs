//! Encrypted vault lifecycle.
//!
//! This module provides:
//! - the decrypted data model (`model`)
//! - the sealed on-store record (`storage`)
//! - session expiry arithmetic (`session`)
//! - schema reconciliation and migrations (`migration`)
//! - `VaultManager`, which ties them together behind a passphrase
//!
//! The vault key is derived from the user's passphrase with PBKDF2-HMAC-SHA256
//! and never leaves the process.

pub mod auth;
pub mod error;
pub mod manager;
pub mod migration;
pub mod model;
pub mod session;
pub mod storage;

pub use auth::VaultStatus;
pub use error::{VaultError, VaultResult};
pub use manager::VaultManager;
pub use migration::{reconcile, ReconcileReport};
pub use model::{
    Block, Credential, IdentityDraft, IdentityPreset, Note, SecretString, Vault, DEFAULT_BLOCK_ID,
};
pub use session::{DEFAULT_SESSION_MS, MAX_SESSION_MS, REAUTH_SESSION_MS};
