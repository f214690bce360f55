//! Applying a decoded import to a vault.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use super::{ImportBundle, ImportMode, ImportSummary};
use crate::security::validate;
use crate::vault::manager::{
    BLOCK_NAME_MAX_LEN, IDENTITY_FIELD_MAX_LEN, NOTE_CONTENT_MAX_LEN, NOTE_TITLE_MAX_LEN,
    SECRET_MAX_LEN, SITE_MAX_LEN, USERNAME_MAX_LEN,
};
use crate::vault::migration::reconcile;
use crate::vault::model::{Block, Credential, IdentityPreset, Note, Vault};
use crate::vault::{VaultError, VaultResult};

fn credential_is_valid(c: &Credential) -> bool {
    validate(&c.site, SITE_MAX_LEN)
        && validate(&c.username, USERNAME_MAX_LEN)
        && validate(c.secret_value.expose(), SECRET_MAX_LEN)
}

fn note_is_valid(n: &Note) -> bool {
    validate(&n.title, NOTE_TITLE_MAX_LEN) && validate(&n.content, NOTE_CONTENT_MAX_LEN)
}

fn preset_is_valid(p: &IdentityPreset) -> bool {
    [
        &p.name,
        &p.tax_id,
        &p.birthdate,
        &p.email,
        &p.profile_link,
        &p.address,
    ]
    .into_iter()
    .all(|field| validate(field, IDENTITY_FIELD_MAX_LEN))
}

/// Drop entries that would not be accepted through the regular operations.
fn sanitize(incoming: &mut Vault) -> usize {
    let before = incoming.blocks.len()
        + incoming.credentials.len()
        + incoming.notes.len()
        + incoming.identity_presets.len();

    incoming
        .blocks
        .retain(|b| b.is_default() || (!b.name.trim().is_empty() && validate(&b.name, BLOCK_NAME_MAX_LEN)));
    incoming.credentials.retain(credential_is_valid);
    incoming.notes.retain(note_is_valid);
    incoming.identity_presets.retain(preset_is_valid);

    before
        - (incoming.blocks.len()
            + incoming.credentials.len()
            + incoming.notes.len()
            + incoming.identity_presets.len())
}

/// Apply `bundle` to `vault` according to `mode`.
///
/// Both modes finish with schema reconciliation, so nothing in the result
/// references a missing block.
pub fn apply(vault: &mut Vault, bundle: ImportBundle, mode: ImportMode) -> VaultResult<ImportSummary> {
    let mut incoming = bundle.vault;

    if let ImportMode::Replace { confirmed: false } = mode {
        incoming.zeroize();
        return Err(VaultError::ConfirmationRequired);
    }

    // Bring legacy exports to the current schema before looking at them
    reconcile(&mut incoming);
    let skipped = sanitize(&mut incoming);
    if skipped > 0 {
        warn!("Skipped {} imported entries that failed validation", skipped);
    }

    let mut summary = match mode {
        ImportMode::Replace { .. } => replace(vault, incoming),
        ImportMode::Merge => merge(vault, incoming),
    };
    summary.skipped = skipped;

    reconcile(vault);
    debug!("Import applied: {:?}", summary);
    Ok(summary)
}

fn replace(vault: &mut Vault, incoming: Vault) -> ImportSummary {
    let summary = ImportSummary {
        blocks: incoming.blocks.iter().filter(|b| !b.is_default()).count(),
        credentials: incoming.credentials.len(),
        notes: incoming.notes.len(),
        identity_presets: incoming.identity_presets.len(),
        skipped: 0,
    };

    let mut previous = std::mem::replace(vault, incoming);
    previous.zeroize();
    summary
}

fn merge(vault: &mut Vault, mut incoming: Vault) -> ImportSummary {
    let mut summary = ImportSummary::default();

    // Imported block id -> block id in the target vault
    let mut block_map: HashMap<String, String> = HashMap::new();
    for block in incoming.blocks.drain(..) {
        let target = vault
            .block(&block.id)
            .or_else(|| vault.block_by_name(&block.name))
            .map(|existing| existing.id.clone());

        let id = match target {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                vault.blocks.push(Block {
                    id: id.clone(),
                    name: block.name.clone(),
                });
                summary.blocks += 1;
                id
            }
        };
        block_map.insert(block.id.clone(), id);
    }

    let map_block = |vault: &Vault, imported: &str| match block_map.get(imported) {
        Some(id) => id.clone(),
        None => vault.resolve_block_id(imported),
    };

    for mut credential in incoming.credentials.drain(..) {
        credential.id = Uuid::new_v4().to_string();
        credential.block_id = map_block(vault, &credential.block_id);
        vault.credentials.push(credential);
        summary.credentials += 1;
    }

    for mut note in incoming.notes.drain(..) {
        note.id = Uuid::new_v4().to_string();
        note.block_id = map_block(vault, &note.block_id);
        vault.notes.push(note);
        summary.notes += 1;
    }

    for mut preset in incoming.identity_presets.drain(..) {
        preset.id = Uuid::new_v4().to_string();
        vault.identity_presets.push(preset);
        summary.identity_presets += 1;
    }

    summary
}
