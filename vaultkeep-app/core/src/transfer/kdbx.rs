//! KeePass (KDBX 4) export and import.
//!
//! Only available with the `kdbx` cargo feature; without it both directions
//! fail with `DependencyMissing`.

use crate::security::Passphrase;
use crate::vault::model::Vault;
use crate::vault::{VaultError, VaultResult};

#[cfg(feature = "kdbx")]
mod imp {
    use std::collections::HashMap;

    use keepass::db::{Entry, Group, Node, Value};
    use keepass::error::DatabaseOpenError;
    use keepass::{Database, DatabaseKey};
    use uuid::Uuid;

    use crate::security::Passphrase;
    use crate::vault::model::{Block, Credential, Vault, DEFAULT_BLOCK_ID, DEFAULT_BLOCK_NAME};
    use crate::vault::{VaultError, VaultResult};

    const ROOT_GROUP: &str = "VaultKeep";

    pub(super) fn encode(vault: &Vault, passphrase: &Passphrase) -> VaultResult<Vec<u8>> {
        let mut db = Database::new(Default::default());
        db.root = Group::new(ROOT_GROUP);

        for block in &vault.blocks {
            let mut group = Group::new(&block.name);
            for credential in vault.credentials.iter().filter(|c| c.block_id == block.id) {
                let mut entry = Entry::new();
                let fields = [
                    ("Title", Value::Unprotected(credential.site.clone())),
                    ("URL", Value::Unprotected(credential.site.clone())),
                    ("UserName", Value::Unprotected(credential.username.clone())),
                    (
                        "Password",
                        Value::Protected(credential.secret_value.expose().as_bytes().into()),
                    ),
                ];
                for (name, value) in fields {
                    entry.fields.insert(name.to_string(), value);
                }
                group.add_child(entry);
            }
            db.root.add_child(group);
        }

        let mut out = Vec::new();
        db.save(
            &mut out,
            DatabaseKey::new().with_password(passphrase.as_str()),
        )
        .map_err(|e| VaultError::Encryption(format!("KDBX save failed: {}", e)))?;
        Ok(out)
    }

    pub(super) fn decode(bytes: &[u8], passphrase: &Passphrase) -> VaultResult<Vault> {
        let mut source = bytes;
        let db = Database::open(
            &mut source,
            DatabaseKey::new().with_password(passphrase.as_str()),
        )
        .map_err(|e| match e {
            DatabaseOpenError::Key(_) => VaultError::AuthFailure,
            other => VaultError::Malformed(format!("KDBX: {}", other)),
        })?;

        let mut vault = Vault::new();
        let mut block_ids: HashMap<String, String> = HashMap::new();
        block_ids.insert(DEFAULT_BLOCK_NAME.to_string(), DEFAULT_BLOCK_ID.to_string());
        collect(&db.root, DEFAULT_BLOCK_ID, &mut vault, &mut block_ids);
        Ok(vault)
    }

    /// Walk the group tree. Each named group becomes a block; entries directly
    /// under the root land in the default block.
    fn collect(
        group: &Group,
        block_id: &str,
        vault: &mut Vault,
        block_ids: &mut HashMap<String, String>,
    ) {
        for node in &group.children {
            match node {
                Node::Group(child) => {
                    let id = block_ids
                        .entry(child.name.clone())
                        .or_insert_with(|| {
                            let block = Block {
                                id: Uuid::new_v4().to_string(),
                                name: child.name.clone(),
                            };
                            let id = block.id.clone();
                            vault.blocks.push(block);
                            id
                        })
                        .clone();
                    collect(child, &id, vault, block_ids);
                }
                Node::Entry(entry) => {
                    let site = entry
                        .get("URL")
                        .filter(|url| !url.is_empty())
                        .or_else(|| entry.get_title())
                        .unwrap_or_default();
                    vault.credentials.push(Credential {
                        id: Uuid::new_v4().to_string(),
                        block_id: block_id.to_string(),
                        site: site.to_string(),
                        username: entry.get_username().unwrap_or_default().to_string(),
                        secret_value: entry.get_password().unwrap_or_default().into(),
                    });
                }
            }
        }
    }
}

pub(super) async fn encode(vault: Vault, passphrase: Passphrase) -> VaultResult<Vec<u8>> {
    #[cfg(feature = "kdbx")]
    {
        if passphrase.is_empty() {
            return Err(VaultError::PasswordRequired);
        }
        tokio::task::spawn_blocking(move || {
            let mut vault = vault;
            let result = imp::encode(&vault, &passphrase);
            zeroize::Zeroize::zeroize(&mut vault);
            result
        })
        .await
        .map_err(|e| VaultError::Encryption(format!("KDBX task failed: {}", e)))?
    }

    #[cfg(not(feature = "kdbx"))]
    {
        let _ = (vault, passphrase);
        Err(missing())
    }
}

pub(super) async fn decode(bytes: Vec<u8>, passphrase: Passphrase) -> VaultResult<Vault> {
    #[cfg(feature = "kdbx")]
    {
        if passphrase.is_empty() {
            return Err(VaultError::PasswordRequired);
        }
        tokio::task::spawn_blocking(move || imp::decode(&bytes, &passphrase))
            .await
            .map_err(|e| VaultError::Encryption(format!("KDBX task failed: {}", e)))?
    }

    #[cfg(not(feature = "kdbx"))]
    {
        let _ = (bytes, passphrase);
        Err(missing())
    }
}

#[cfg(not(feature = "kdbx"))]
fn missing() -> VaultError {
    VaultError::DependencyMissing("KDBX support (build with the `kdbx` feature)".into())
}
