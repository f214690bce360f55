//! Plain and passphrase-protected JSON exports.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::PROTECTED_FORMAT_TAG;
use crate::security::{self, Envelope, Passphrase};
use crate::vault::model::{Block, Credential, IdentityPreset, Note, Vault};
use crate::vault::{VaultError, VaultResult};

/// A vault sealed under a key derived from an export passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProtectedDocument {
    format: String,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    aad: Vec<u8>,
    ciphertext: Vec<u8>,
}

/// A plain vault export. `credentials` is mandatory so that arbitrary JSON
/// objects are not mistaken for an empty vault.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlainDocument {
    #[serde(default = "legacy_version")]
    version: u32,
    #[serde(alias = "blks", default)]
    blocks: Vec<Block>,
    #[serde(alias = "pwds")]
    credentials: Vec<Credential>,
    #[serde(default)]
    notes: Vec<Note>,
    #[serde(alias = "prs", default)]
    identity_presets: Vec<IdentityPreset>,
}

fn legacy_version() -> u32 {
    1
}

impl From<PlainDocument> for Vault {
    fn from(doc: PlainDocument) -> Self {
        Vault {
            version: doc.version,
            blocks: doc.blocks,
            credentials: doc.credentials,
            notes: doc.notes,
            identity_presets: doc.identity_presets,
        }
    }
}

/// First structural match wins, protected before plain.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Protected(ProtectedDocument),
    Plain(PlainDocument),
}

pub(super) fn encode_plain(vault: &Vault) -> VaultResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(vault)?)
}

pub(super) async fn encode_protected(
    vault: &Vault,
    passphrase: Passphrase,
    now_ms: i64,
) -> VaultResult<Vec<u8>> {
    let salt = security::generate_salt();
    let key = security::derive_key(passphrase, &salt).await?;
    let envelope = security::seal(vault, &key, now_ms)?;

    let doc = ProtectedDocument {
        format: PROTECTED_FORMAT_TAG.to_string(),
        salt: salt.to_vec(),
        nonce: envelope.nonce,
        aad: envelope.aad,
        ciphertext: envelope.ciphertext,
    };
    Ok(serde_json::to_vec_pretty(&doc)?)
}

pub(super) async fn decode(bytes: &[u8], passphrase: Option<Passphrase>) -> VaultResult<Vault> {
    let doc: JsonDocument = serde_json::from_slice(bytes).map_err(|e| {
        warn!("Import is not a recognised JSON export: {}", e);
        VaultError::Malformed("Not a vault export".into())
    })?;

    match doc {
        JsonDocument::Protected(doc) => {
            if doc.format != PROTECTED_FORMAT_TAG {
                return Err(VaultError::UnsupportedFormat(doc.format));
            }
            let passphrase = passphrase.ok_or(VaultError::PasswordRequired)?;
            if passphrase.is_empty() {
                return Err(VaultError::PasswordRequired);
            }

            let key = security::derive_key(passphrase, &doc.salt)
                .await
                .map_err(|e| match e {
                    // Short salt: the file was tampered with or truncated
                    VaultError::InvalidInput(_) => VaultError::AuthFailure,
                    other => other,
                })?;
            let envelope = Envelope {
                nonce: doc.nonce,
                aad: doc.aad,
                ciphertext: doc.ciphertext,
            };
            security::open(&envelope, &key)
        }
        JsonDocument::Plain(doc) => Ok(doc.into()),
    }
}
