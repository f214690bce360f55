//! Durable key-value storage.
//!
//! The vault never talks to a filesystem or browser store directly; it goes
//! through [`KeyValueStore`], so hosts can plug in whatever medium they have.

mod config;
mod file;
mod memory;

pub use config::{load_settings, save_settings, AppSettings};
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::vault::VaultResult;

/// Key holding the sealed vault envelope.
pub const VAULT_KEY: &str = "vault";

/// Key holding the advisory session expiry (epoch ms, decimal string).
pub const SESSION_EXPIRY_KEY: &str = "sessionExpiry";

/// Key holding the plaintext, non-secret settings.
pub const CONFIG_KEY: &str = "config";

/// A durable string-to-string store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> VaultResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> VaultResult<()>;

    fn contains(&self, key: &str) -> VaultResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
