//! Vault-specific error types.
//!
//! This module provides granular error handling for vault operations,
//! allowing a presentation layer to display appropriate user-facing messages
//! and decide whether to re-prompt, retry later or give up.

use thiserror::Error;

/// Errors that can occur during vault operations.
///
/// `InvalidInput`, `RateLimited`, `UnsupportedFormat` and `PasswordRequired`
/// are always locally recoverable. `AuthFailure` is recoverable by
/// re-prompting; its message is identical for a wrong passphrase and for a
/// tampered envelope.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Malformed, oversized or unsafe text, rejected before reaching crypto.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Too many attempts for this action inside the current window.
    #[error("Too many attempts, try again later")]
    RateLimited,

    /// Wrong passphrase or tampered/corrupt envelope.
    #[error("Authentication failed")]
    AuthFailure,

    /// A protected import file was supplied without a passphrase.
    #[error("A password is required to read this file")]
    PasswordRequired,

    /// The import file type is not recognized.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A format collaborator (e.g. the KDBX codec) is not compiled in.
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    /// The vault has not been created yet.
    #[error("Vault not set up")]
    NotSetup,

    /// A vault already exists when trying to create one.
    #[error("Vault already exists")]
    AlreadyExists,

    /// The session is not authenticated (locked or expired).
    #[error("Vault is locked")]
    Locked,

    /// The referenced block, credential, note or preset does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A destructive import was requested without explicit confirmation.
    #[error("Replacing the vault contents requires confirmation")]
    ConfirmationRequired,

    /// The import file was recognized but could not be parsed.
    #[error("Malformed file: {0}")]
    Malformed(String),

    /// A cryptographic primitive failed (not an authentication failure).
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The durable store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An I/O error occurred (file access, permissions, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Stable code for programmatic handling by a presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::InvalidInput(_) => "INVALID_INPUT",
            VaultError::RateLimited => "RATE_LIMITED",
            VaultError::AuthFailure => "AUTH_FAILURE",
            VaultError::PasswordRequired => "PASSWORD_REQUIRED",
            VaultError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            VaultError::DependencyMissing(_) => "DEPENDENCY_MISSING",
            VaultError::NotSetup => "NOT_SETUP",
            VaultError::AlreadyExists => "ALREADY_EXISTS",
            VaultError::Locked => "LOCKED",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            VaultError::Malformed(_) => "MALFORMED",
            VaultError::Encryption(_) => "ENCRYPTION_ERROR",
            VaultError::Storage(_) => "STORAGE_ERROR",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the caller can recover by correcting input or re-prompting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidInput(_)
                | VaultError::RateLimited
                | VaultError::AuthFailure
                | VaultError::PasswordRequired
                | VaultError::UnsupportedFormat(_)
                | VaultError::NotFound(_)
                | VaultError::ConfirmationRequired
                | VaultError::Malformed(_)
                | VaultError::Locked
        )
    }
}

/// Result type alias for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

// ============================================================================
// Serialization for the presentation layer
// ============================================================================

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
