//! Import and export of vault contents.
//!
//! Export formats:
//! - plain JSON (unencrypted, for interoperability)
//! - protected JSON (sealed with a key derived from an export passphrase)
//! - CSV (credentials only)
//! - KDBX (behind the `kdbx` cargo feature)
//!
//! Imports are decoded into an [`ImportBundle`] first and only touch the
//! vault in [`apply`], which the caller runs on a copy before persisting.

mod csv;
mod json;
mod kdbx;
mod merge;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::security::Passphrase;
use crate::vault::model::Vault;
use crate::vault::{VaultError, VaultResult};

pub use merge::apply;

/// Leading bytes of every KDBX database (signature 1 and 2).
pub const KDBX_MAGIC: [u8; 8] = [0x03, 0xD9, 0xA2, 0x9A, 0x67, 0xFB, 0x4B, 0xB5];

/// Value of the `format` field in protected exports.
pub const PROTECTED_FORMAT_TAG: &str = "vaultkeep-protected";

/// Requested export.
#[derive(Debug)]
pub enum ExportFormat {
    PlainJson,
    ProtectedJson { passphrase: Passphrase },
    Csv,
    Kdbx { passphrase: Passphrase },
}

impl ExportFormat {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PlainJson => "plain JSON",
            Self::ProtectedJson { .. } => "protected JSON",
            Self::Csv => "CSV",
            Self::Kdbx { .. } => "KDBX",
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            Self::ProtectedJson { .. } => "vaultkeep-protected",
            _ => "vaultkeep-export",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::PlainJson | Self::ProtectedJson { .. } => "json",
            Self::Csv => "csv",
            Self::Kdbx { .. } => "kdbx",
        }
    }
}

/// An encoded export ready to be written out.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ExportFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportFile")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportFormat {
    Json,
    Csv,
    Kdbx,
}

/// Decoded import contents, not yet applied to any vault.
#[derive(Debug, Clone)]
pub struct ImportBundle {
    pub format: ImportFormat,
    pub vault: Vault,
}

/// How an import combines with the existing vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// Discard the current contents. Refused unless `confirmed`.
    Replace { confirmed: bool },
    /// Add everything under fresh ids.
    Merge,
}

/// Counts of what an import added.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub blocks: usize,
    pub credentials: usize,
    pub notes: usize,
    pub identity_presets: usize,
    /// Entries dropped because they failed input validation.
    pub skipped: usize,
}

/// Encode `vault` as `format`. The file name carries the UTC date of `now_ms`.
pub async fn export(vault: &Vault, format: ExportFormat, now_ms: i64) -> VaultResult<ExportFile> {
    let date = DateTime::<Utc>::from_timestamp_millis(now_ms)
        .ok_or_else(|| VaultError::InvalidInput(format!("Timestamp out of range: {}", now_ms)))?;
    let file_name = format!(
        "{}-{}.{}",
        format.file_stem(),
        date.format("%Y-%m-%d"),
        format.extension()
    );

    let bytes = match format {
        ExportFormat::PlainJson => json::encode_plain(vault)?,
        ExportFormat::ProtectedJson { passphrase } => {
            json::encode_protected(vault, passphrase, now_ms).await?
        }
        ExportFormat::Csv => csv::encode(vault)?,
        ExportFormat::Kdbx { passphrase } => kdbx::encode(vault.clone(), passphrase).await?,
    };

    Ok(ExportFile { file_name, bytes })
}

/// Work out the format of an import from its file name, then its content.
pub fn detect_format(file_name: &str, bytes: &[u8]) -> VaultResult<ImportFormat> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => return Ok(ImportFormat::Json),
        Some("csv") => return Ok(ImportFormat::Csv),
        Some("kdbx") => return Ok(ImportFormat::Kdbx),
        _ => {}
    }

    if bytes.starts_with(&KDBX_MAGIC) {
        return Ok(ImportFormat::Kdbx);
    }

    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('{') {
        return Ok(ImportFormat::Json);
    }
    if csv::looks_like_header(trimmed) {
        return Ok(ImportFormat::Csv);
    }

    Err(VaultError::UnsupportedFormat(file_name.to_string()))
}

/// Decode an import. Protected JSON and KDBX need `passphrase`.
pub async fn decode(
    file_name: &str,
    bytes: &[u8],
    passphrase: Option<Passphrase>,
) -> VaultResult<ImportBundle> {
    let format = detect_format(file_name, bytes)?;
    debug!("Decoding import {} as {:?}", file_name, format);

    let vault = match format {
        ImportFormat::Json => json::decode(bytes, passphrase).await?,
        ImportFormat::Csv => csv::decode(bytes)?,
        ImportFormat::Kdbx => {
            let passphrase = passphrase.ok_or(VaultError::PasswordRequired)?;
            kdbx::decode(bytes.to_vec(), passphrase).await?
        }
    };

    Ok(ImportBundle { format, vault })
}
