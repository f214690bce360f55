//! Vault authentication state.

use serde::{Deserialize, Serialize};

/// Represents the current state of the vault.
///
/// The vault transitions between these states:
/// - `NotSetup` → `Unlocked` (after first-time creation)
/// - `Unlocked` → `Locked` (explicit lock, session expiry, or process end)
/// - `Locked` → `Unlocked` (after a successful open with the passphrase)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VaultStatus {
    /// No vault has been created yet (first-time user)
    #[default]
    NotSetup,
    /// Vault exists but is locked (requires the passphrase)
    Locked,
    /// Vault is open and the session has not expired
    Unlocked,
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSetup => write!(f, "NotSetup"),
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}
