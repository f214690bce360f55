//! VaultKeep: a passphrase-protected local vault for credentials, notes and
//! identity presets.
//!
//! The vault is sealed with AES-256-GCM under a key derived from the
//! passphrase (PBKDF2-HMAC-SHA256), persisted through a pluggable
//! [`storage::KeyValueStore`], and only decrypted in memory while a
//! time-limited session is active.

pub mod clock;
pub mod error;
pub mod security;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod vault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AppError, Result};
pub use security::{GeneratorOptions, Passphrase};
pub use state::{AppState, SESSION_WATCH_INTERVAL};
pub use storage::{AppSettings, FileStore, KeyValueStore, MemoryStore};
pub use transfer::{ExportFile, ExportFormat, ImportFormat, ImportMode, ImportSummary};
pub use vault::{VaultError, VaultManager, VaultResult, VaultStatus};
