//! The decrypted vault aggregate.
//!
//! Everything here only ever exists in memory while a session is active.
//! Field names serialize in camelCase; aliases accept the legacy short names
//! used by older stored vaults (`blks`, `pwds`, `prs`, `blk`, `usr`, `val`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Id of the mandatory, undeletable block.
pub const DEFAULT_BLOCK_ID: &str = "default";

/// Display name of the default block.
pub const DEFAULT_BLOCK_NAME: &str = "General";

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// An owned secret string, wiped on drop and redacted in debug output.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretString)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Block {
    pub id: String,
    pub name: String,
}

impl Block {
    pub fn default_block() -> Self {
        Self {
            id: DEFAULT_BLOCK_ID.to_string(),
            name: DEFAULT_BLOCK_NAME.to_string(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_BLOCK_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    #[serde(alias = "blk", default = "default_block_id")]
    pub block_id: String,
    #[serde(default)]
    pub site: String,
    #[serde(alias = "usr", default)]
    pub username: String,
    #[serde(alias = "val", default)]
    pub secret_value: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(alias = "blk", default = "default_block_id")]
    pub block_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// A saved synthetic identity. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPreset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "cpf", default)]
    pub tax_id: String,
    #[serde(default)]
    pub birthdate: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub profile_link: String,
    #[serde(default)]
    pub address: String,
}

/// Identity fields supplied by the generator, before an id is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityDraft {
    pub name: String,
    pub tax_id: String,
    pub birthdate: String,
    pub email: String,
    pub profile_link: String,
    pub address: String,
}

impl IdentityDraft {
    pub fn into_preset(self, id: String) -> IdentityPreset {
        IdentityPreset {
            id,
            name: self.name,
            tax_id: self.tax_id,
            birthdate: self.birthdate,
            email: self.email,
            profile_link: self.profile_link,
            address: self.address,
        }
    }
}

/// The root aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(alias = "blks", default)]
    pub blocks: Vec<Block>,
    #[serde(alias = "pwds", default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(alias = "prs", default)]
    pub identity_presets: Vec<IdentityPreset>,
}

fn default_block_id() -> String {
    DEFAULT_BLOCK_ID.to_string()
}

fn legacy_version() -> u32 {
    1
}

impl Vault {
    /// An empty vault holding only the default block.
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            blocks: vec![Block::default_block()],
            credentials: Vec::new(),
            notes: Vec::new(),
            identity_presets: Vec::new(),
        }
    }

    pub fn has_block(&self, id: &str) -> bool {
        self.blocks.iter().any(|b| b.id == id)
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_by_name(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// `block_id` if it names an existing block, otherwise the default block.
    pub fn resolve_block_id(&self, block_id: &str) -> String {
        if self.has_block(block_id) {
            block_id.to_string()
        } else {
            DEFAULT_BLOCK_ID.to_string()
        }
    }

    /// Display name for a block id, falling back to the default block's name.
    pub fn block_name(&self, block_id: &str) -> &str {
        self.block(block_id)
            .map(|b| b.name.as_str())
            .unwrap_or(DEFAULT_BLOCK_NAME)
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vault_has_default_block() {
        let vault = Vault::new();
        assert_eq!(vault.version, CURRENT_VERSION);
        assert_eq!(vault.blocks, vec![Block::default_block()]);
        assert!(vault.blocks[0].is_default());
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut vault = Vault::new();
        vault.credentials.push(Credential {
            id: "c1".into(),
            block_id: DEFAULT_BLOCK_ID.into(),
            site: "example.com".into(),
            username: "alice".into(),
            secret_value: "p@ss".into(),
        });
        let json = serde_json::to_value(&vault).unwrap();
        assert!(json.get("identityPresets").is_some());
        assert_eq!(json["credentials"][0]["blockId"], "default");
        assert_eq!(json["credentials"][0]["secretValue"], "p@ss");
    }

    #[test]
    fn test_decodes_legacy_field_names() {
        let legacy = r#"{
            "blks": [{"id": "default", "name": "Geral"}],
            "pwds": [{"id": "pwd_1", "blk": "default", "site": "a.com", "usr": "bob", "val": "x"}],
            "prs": [{"id": "prs_1", "name": "Ana", "cpf": "123"}],
            "notes": []
        }"#;
        let vault: Vault = serde_json::from_str(legacy).unwrap();
        assert_eq!(vault.version, 1);
        assert_eq!(vault.credentials[0].username, "bob");
        assert_eq!(vault.credentials[0].secret_value.expose(), "x");
        assert_eq!(vault.identity_presets[0].tax_id, "123");
    }

    #[test]
    fn test_resolve_block_id_falls_back_to_default() {
        let vault = Vault::new();
        assert_eq!(vault.resolve_block_id("missing"), DEFAULT_BLOCK_ID);
        assert_eq!(vault.resolve_block_id(DEFAULT_BLOCK_ID), DEFAULT_BLOCK_ID);
    }

    #[test]
    fn test_zeroize_clears_everything() {
        let mut vault = Vault::new();
        vault.notes.push(Note {
            id: "n1".into(),
            block_id: DEFAULT_BLOCK_ID.into(),
            title: "t".into(),
            content: "secret".into(),
        });
        vault.zeroize();
        assert!(vault.blocks.is_empty());
        assert!(vault.notes.is_empty());
        assert_eq!(vault.version, 0);
    }

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"hunter2\"");
    }
}
