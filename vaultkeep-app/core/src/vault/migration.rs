//! Schema reconciliation and version-keyed migrations.
//!
//! `reconcile` runs on every open and after every import. It restores the
//! block invariants (exactly one default block, no dangling block
//! references) and applies each pending migration exactly once, bumping
//! `Vault::version` as it goes.

use std::collections::HashSet;

use tracing::info;
use zeroize::Zeroize;

use super::model::{Block, Note, Vault, CURRENT_VERSION, DEFAULT_BLOCK_ID};

/// Demonstration blocks shipped by version 1 vaults.
const LEGACY_DEMO_BLOCKS: &[&str] = &["xss", "sqli", "pentest"];

/// What reconciliation changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The default block was missing (or duplicated) and was repaired.
    pub repaired_default_block: bool,
    /// Credentials and notes moved to the default block.
    pub reassigned: usize,
    /// Versions migrated through, oldest first.
    pub migrations: Vec<u32>,
    pub removed_blocks: usize,
    pub removed_credentials: usize,
    pub removed_notes: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        *self != Self::default()
    }
}

/// Bring `vault` up to the current schema and restore its invariants.
pub fn reconcile(vault: &mut Vault) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    if vault.version < 2 {
        migrate_v1_to_v2(vault, &mut report);
        report.migrations.push(2);
    }
    if vault.version < CURRENT_VERSION {
        vault.version = CURRENT_VERSION;
    }

    ensure_default_block(vault, &mut report);
    reassign_orphans(vault, &mut report);

    if report.changed() {
        info!(
            "Reconciled vault: migrations={:?} reassigned={} removed blocks/credentials/notes={}/{}/{}",
            report.migrations,
            report.reassigned,
            report.removed_blocks,
            report.removed_credentials,
            report.removed_notes
        );
    }
    report
}

/// Version 1 vaults carried demonstration blocks and re-injected the same
/// demonstration notes on every open, leaving duplicates behind.
fn migrate_v1_to_v2(vault: &mut Vault, report: &mut ReconcileReport) {
    let before = vault.blocks.len();
    vault
        .blocks
        .retain(|b| !LEGACY_DEMO_BLOCKS.contains(&b.id.as_str()));
    report.removed_blocks += before - vault.blocks.len();

    let before = vault.credentials.len();
    vault
        .credentials
        .retain(|c| !LEGACY_DEMO_BLOCKS.contains(&c.block_id.as_str()));
    report.removed_credentials += before - vault.credentials.len();

    // Demonstration notes were re-injected on every open. Drop any whose
    // title is already taken; user notes are never removed.
    let (legacy, mut notes): (Vec<Note>, Vec<Note>) = std::mem::take(&mut vault.notes)
        .into_iter()
        .partition(|n| LEGACY_DEMO_BLOCKS.contains(&n.block_id.as_str()));
    let mut titles: HashSet<String> = notes.iter().map(|n| n.title.clone()).collect();
    for mut note in legacy {
        if titles.insert(note.title.clone()) {
            note.block_id = DEFAULT_BLOCK_ID.to_string();
            report.reassigned += 1;
            notes.push(note);
        } else {
            note.zeroize();
            report.removed_notes += 1;
        }
    }
    vault.notes = notes;

    vault.version = 2;
}

fn ensure_default_block(vault: &mut Vault, report: &mut ReconcileReport) {
    let defaults = vault.blocks.iter().filter(|b| b.is_default()).count();
    match defaults {
        1 => {}
        0 => {
            vault.blocks.insert(0, Block::default_block());
            report.repaired_default_block = true;
        }
        _ => {
            let mut kept = false;
            vault.blocks.retain(|b| {
                if !b.is_default() {
                    return true;
                }
                let keep = !kept;
                kept = true;
                keep
            });
            report.repaired_default_block = true;
        }
    }
}

fn reassign_orphans(vault: &mut Vault, report: &mut ReconcileReport) {
    let known: HashSet<String> = vault.blocks.iter().map(|b| b.id.clone()).collect();

    for credential in vault.credentials.iter_mut() {
        if !known.contains(&credential.block_id) {
            credential.block_id = DEFAULT_BLOCK_ID.to_string();
            report.reassigned += 1;
        }
    }
    for note in vault.notes.iter_mut() {
        if !known.contains(&note.block_id) {
            note.block_id = DEFAULT_BLOCK_ID.to_string();
            report.reassigned += 1;
        }
    }
}
