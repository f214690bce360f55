//! VaultManager - Core vault lifecycle management.
//!
//! This module provides the VaultManager struct that handles:
//! - Vault creation, opening and re-authentication with a passphrase
//! - The session-expiry gate in front of every read and write
//! - Whole-vault re-encryption after every mutation
//! - Locking (key discarded, decrypted contents scrubbed)
//! - Import and export through the `transfer` codecs
//!
//! The encryption key is derived from the user's passphrase with PBKDF2 and a
//! per-vault salt; the passphrase itself is never stored.

use std::sync::Arc;

use serde::de::IgnoredAny;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::clock::Clock;
use crate::security::{self, validate, Passphrase, RateLimiter, Salt, VaultKey};
use crate::storage::KeyValueStore;
use crate::transfer::{self, ExportFile, ExportFormat, ImportMode, ImportSummary};
use crate::vault::migration::reconcile;
use crate::vault::model::{
    Block, Credential, IdentityDraft, IdentityPreset, Note, SecretString, Vault, DEFAULT_BLOCK_ID,
};
use crate::vault::session::{Session, REAUTH_SESSION_MS};
use crate::vault::storage::{
    clear_session_marker, delete_envelope, read_envelope, read_session_marker, vault_exists,
    write_envelope, write_session_marker, StoredEnvelope,
};
use crate::vault::{VaultError, VaultResult, VaultStatus};

/// Rate-limit bucket shared by create and open.
const AUTH_ACTION: &str = "auth";

/// Rate-limit bucket for re-authentication.
const REAUTH_ACTION: &str = "reauth";

/// Input limits, in characters.
pub const PASSPHRASE_MAX_LEN: usize = 128;
pub const BLOCK_NAME_MAX_LEN: usize = 50;
pub const SITE_MAX_LEN: usize = 100;
pub const USERNAME_MAX_LEN: usize = 200;
pub const SECRET_MAX_LEN: usize = 500;
pub const NOTE_TITLE_MAX_LEN: usize = 100;
pub const NOTE_CONTENT_MAX_LEN: usize = 5000;
pub const IDENTITY_FIELD_MAX_LEN: usize = 200;

/// Seal `vault` and write it to the store with a fresh timestamp.
fn persist(
    store: &dyn KeyValueStore,
    salt: &Salt,
    key: &VaultKey,
    vault: &Vault,
    now_ms: i64,
) -> VaultResult<()> {
    let data = security::seal(vault, key, now_ms)?;
    write_envelope(
        store,
        &StoredEnvelope {
            salt: salt.to_vec(),
            data,
            timestamp: now_ms,
        },
    )
}

fn check_field(value: &str, max_len: usize, field: &str) -> VaultResult<()> {
    if validate(value, max_len) {
        Ok(())
    } else {
        Err(VaultError::InvalidInput(format!(
            "{} is too long or contains disallowed content",
            field
        )))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// VaultManager handles the lifecycle of the encrypted vault.
///
/// Every sensitive operation re-checks [`VaultManager::is_authenticated`]
/// against the clock; nothing is cached. Mutations work on a copy of the
/// vault that only replaces the in-memory state once it has been persisted.
pub struct VaultManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    /// The derived encryption key (only present while a session is held)
    key: Option<VaultKey>,
    /// Salt of the currently loaded vault
    salt: Option<Salt>,
    /// Decrypted vault (loaded on create/open, scrubbed on lock)
    vault: Option<Vault>,
    session: Session,
}

impl VaultManager {
    /// Create a manager over `store`, using `clock` for every time check.
    ///
    /// A leftover session marker that has already expired is removed.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        match read_session_marker(store.as_ref()) {
            Ok(Some(expiry)) if expiry <= clock.now_ms() => {
                if let Err(e) = clear_session_marker(store.as_ref()) {
                    warn!("Failed to clear expired session marker: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read session marker: {}", e),
        }

        Self {
            limiter: RateLimiter::new(clock.clone()),
            store,
            clock,
            key: None,
            salt: None,
            vault: None,
            session: Session::default(),
        }
    }

    /// Check if a sealed vault has been persisted.
    pub fn exists(&self) -> VaultResult<bool> {
        vault_exists(self.store.as_ref())
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        if self.is_authenticated() {
            return Ok(VaultStatus::Unlocked);
        }
        if self.exists()? {
            Ok(VaultStatus::Locked)
        } else {
            Ok(VaultStatus::NotSetup)
        }
    }

    /// Key held and the session has not expired. Re-evaluated on every call.
    pub fn is_authenticated(&self) -> bool {
        self.key.is_some() && self.session.is_active(self.clock.now_ms())
    }

    /// Milliseconds left in the session, 0 when locked or expired.
    pub fn session_time_remaining(&self) -> i64 {
        if self.key.is_none() {
            return 0;
        }
        self.session.remaining(self.clock.now_ms())
    }

    /// Whether the advisory marker says a session was recently active.
    ///
    /// Only used to pick between a login and a registration prompt; it
    /// never grants access.
    pub fn has_valid_session(&self) -> VaultResult<bool> {
        let now = self.clock.now_ms();
        Ok(read_session_marker(self.store.as_ref())?.is_some_and(|expiry| expiry > now))
    }

    fn require_authenticated(&self) -> VaultResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(VaultError::Locked)
        }
    }

    /// Rate-limit, then validate, a passphrase before any KDF work.
    fn admit(&mut self, action: &str, passphrase: &Passphrase) -> VaultResult<()> {
        if !self.limiter.check(action) {
            return Err(VaultError::RateLimited);
        }
        if passphrase.is_empty() || !validate(passphrase.as_str(), PASSPHRASE_MAX_LEN) {
            return Err(VaultError::InvalidInput("Passphrase contains invalid characters".into()));
        }
        Ok(())
    }

    fn start_session(&mut self, duration_ms: i64) {
        let now = self.clock.now_ms();
        self.session = Session::start(now, duration_ms);
        self.write_marker();
    }

    fn write_marker(&self) {
        if let Err(e) = write_session_marker(self.store.as_ref(), self.session.expiry_ms()) {
            warn!("Failed to persist session marker: {}", e);
        }
    }

    /// Replace the in-memory state, scrubbing whatever was loaded before.
    fn adopt(&mut self, key: VaultKey, salt: Salt, vault: Vault) {
        if let Some(mut previous) = self.vault.replace(vault) {
            previous.zeroize();
        }
        self.key = Some(key);
        self.salt = Some(salt);
    }

    /// Derive a key from the persisted salt. A salt that cannot be used is
    /// reported like a wrong passphrase.
    async fn derive_from_record(
        passphrase: Passphrase,
        record: &StoredEnvelope,
    ) -> VaultResult<(VaultKey, Salt)> {
        let salt: Salt = record
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::AuthFailure)?;
        let key = security::derive_key(passphrase, &salt)
            .await
            .map_err(|e| match e {
                VaultError::InvalidInput(_) => VaultError::AuthFailure,
                other => other,
            })?;
        Ok((key, salt))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a new vault and start a session of `session_ms`.
    ///
    /// # Errors
    /// `AlreadyExists` if a vault is already persisted; `RateLimited` or
    /// `InvalidInput` before any key derivation happens.
    pub async fn create(&mut self, passphrase: Passphrase, session_ms: i64) -> VaultResult<()> {
        self.admit(AUTH_ACTION, &passphrase)?;

        if self.exists()? {
            return Err(VaultError::AlreadyExists);
        }

        info!("Creating new vault");

        let salt = security::generate_salt();
        let key = security::derive_key(passphrase, &salt).await?;
        let vault = Vault::new();

        persist(self.store.as_ref(), &salt, &key, &vault, self.clock.now_ms())?;

        self.adopt(key, salt, vault);
        self.start_session(session_ms);
        self.limiter.reset(AUTH_ACTION);

        info!("Vault created successfully");
        Ok(())
    }

    /// Open the persisted vault and start a session of `session_ms`.
    ///
    /// On `AuthFailure` nothing changes: not the store, not the in-memory
    /// state.
    pub async fn open(&mut self, passphrase: Passphrase, session_ms: i64) -> VaultResult<()> {
        self.admit(AUTH_ACTION, &passphrase)?;

        let record = read_envelope(self.store.as_ref())?.ok_or(VaultError::NotSetup)?;

        info!("Opening vault");

        let (key, salt) = Self::derive_from_record(passphrase, &record).await?;
        let mut vault: Vault = security::open(&record.data, &key)?;

        let report = reconcile(&mut vault);
        if report.changed() {
            debug!("Vault schema reconciled on open");
        }

        if let Err(e) = persist(self.store.as_ref(), &salt, &key, &vault, self.clock.now_ms()) {
            vault.zeroize();
            return Err(e);
        }

        self.adopt(key, salt, vault);
        self.start_session(session_ms);
        self.limiter.reset(AUTH_ACTION);

        info!("Vault opened successfully");
        Ok(())
    }

    /// Re-validate the passphrase against the persisted envelope and grant a
    /// short session. The in-memory vault is kept as is.
    ///
    /// The session is reset to the fixed re-authentication length regardless
    /// of how long the original login was.
    pub async fn re_authenticate(&mut self, passphrase: Passphrase) -> VaultResult<()> {
        self.admit(REAUTH_ACTION, &passphrase)?;

        if self.vault.is_none() {
            return Err(VaultError::Locked);
        }

        let record = read_envelope(self.store.as_ref())?.ok_or(VaultError::NotSetup)?;
        let (key, salt) = Self::derive_from_record(passphrase, &record).await?;

        // Decrypt only to prove the passphrase; the result is discarded
        security::open::<IgnoredAny>(&record.data, &key)?;

        self.key = Some(key);
        self.salt = Some(salt);
        self.start_session(REAUTH_SESSION_MS);
        self.limiter.reset(REAUTH_ACTION);

        info!("Re-authenticated");
        Ok(())
    }

    /// Extend the session by `additional_minutes`, capped at one hour from now.
    pub fn extend_session(&mut self, additional_minutes: u32) -> VaultResult<()> {
        self.require_authenticated()?;

        let now = self.clock.now_ms();
        self.session.extend(now, i64::from(additional_minutes) * 60_000);
        self.write_marker();

        debug!(
            "Session extended, {} ms remaining",
            self.session.remaining(now)
        );
        Ok(())
    }

    /// Discard the key, scrub the decrypted vault and clear the session
    /// marker. Valid from any state.
    pub fn lock(&mut self) -> VaultResult<()> {
        if self.key.is_some() || self.vault.is_some() {
            info!("Locking vault");
        }

        // VaultKey implements ZeroizeOnDrop, so dropping it erases the key
        self.key = None;
        if let Some(mut vault) = self.vault.take() {
            vault.zeroize();
        }
        self.session.end();

        clear_session_marker(self.store.as_ref())
    }

    /// Lock if a vault is loaded but the session has run out. Returns whether
    /// it locked. Meant to be polled.
    pub fn lock_if_expired(&mut self) -> VaultResult<bool> {
        if self.vault.is_some() && !self.is_authenticated() {
            info!("Session expired");
            self.lock()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Lock and delete the persisted vault. All data is permanently lost.
    pub fn destroy(&mut self) -> VaultResult<()> {
        warn!("Destroying vault - all data will be lost!");
        self.lock()?;
        self.salt = None;
        delete_envelope(self.store.as_ref())?;
        info!("Vault destroyed");
        Ok(())
    }

    /// Re-seal and persist the whole vault.
    pub fn save_vault(&mut self) -> VaultResult<()> {
        self.mutate(|_| Ok(()))
    }

    /// Apply `change` to a copy of the vault, persist the copy, then swap it in.
    fn mutate<T>(&mut self, change: impl FnOnce(&mut Vault) -> VaultResult<T>) -> VaultResult<T> {
        self.require_authenticated()?;

        let now = self.clock.now_ms();
        let (Some(key), Some(salt), Some(current)) =
            (self.key.as_ref(), self.salt.as_ref(), self.vault.as_mut())
        else {
            return Err(VaultError::Locked);
        };

        let mut draft = current.clone();
        let result = change(&mut draft)
            .and_then(|out| persist(self.store.as_ref(), salt, key, &draft, now).map(|_| out));

        match result {
            Ok(out) => {
                let mut previous = std::mem::replace(current, draft);
                previous.zeroize();
                debug!("Vault persisted");
                Ok(out)
            }
            Err(e) => {
                draft.zeroize();
                Err(e)
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The decrypted vault.
    pub fn vault(&self) -> VaultResult<&Vault> {
        self.require_authenticated()?;
        self.vault.as_ref().ok_or(VaultError::Locked)
    }

    pub fn credentials_in(&self, block_id: &str) -> VaultResult<Vec<Credential>> {
        Ok(self
            .vault()?
            .credentials
            .iter()
            .filter(|c| c.block_id == block_id)
            .cloned()
            .collect())
    }

    pub fn notes_in(&self, block_id: &str) -> VaultResult<Vec<Note>> {
        Ok(self
            .vault()?
            .notes
            .iter()
            .filter(|n| n.block_id == block_id)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn add_block(&mut self, name: &str) -> VaultResult<Block> {
        if name.trim().is_empty() {
            return Err(VaultError::InvalidInput("Block name must not be empty".into()));
        }
        check_field(name, BLOCK_NAME_MAX_LEN, "Block name")?;

        let block = Block {
            id: new_id(),
            name: name.to_string(),
        };
        let created = block.clone();
        self.mutate(move |vault| {
            vault.blocks.push(block);
            Ok(())
        })?;
        Ok(created)
    }

    /// Delete a block together with every credential and note inside it.
    pub fn delete_block(&mut self, id: &str) -> VaultResult<()> {
        if id == DEFAULT_BLOCK_ID {
            return Err(VaultError::InvalidInput("The default block cannot be deleted".into()));
        }

        self.mutate(|vault| {
            if !vault.has_block(id) {
                return Err(VaultError::NotFound(format!("block {}", id)));
            }
            vault.blocks.retain(|b| b.id != id);
            vault.credentials.retain(|c| c.block_id != id);
            vault.notes.retain(|n| n.block_id != id);
            Ok(())
        })
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Add a credential. An unknown `block_id` files it under the default block.
    pub fn add_credential(
        &mut self,
        block_id: &str,
        site: &str,
        username: &str,
        secret: SecretString,
    ) -> VaultResult<Credential> {
        check_field(site, SITE_MAX_LEN, "Site")?;
        check_field(username, USERNAME_MAX_LEN, "Username")?;
        check_field(secret.expose(), SECRET_MAX_LEN, "Secret")?;

        self.mutate(|vault| {
            let credential = Credential {
                id: new_id(),
                block_id: vault.resolve_block_id(block_id),
                site: site.to_string(),
                username: username.to_string(),
                secret_value: secret,
            };
            vault.credentials.push(credential.clone());
            Ok(credential)
        })
    }

    pub fn delete_credential(&mut self, id: &str) -> VaultResult<()> {
        self.mutate(|vault| {
            let before = vault.credentials.len();
            vault.credentials.retain(|c| c.id != id);
            if vault.credentials.len() == before {
                return Err(VaultError::NotFound(format!("credential {}", id)));
            }
            Ok(())
        })
    }

    // =========================================================================
    // Notes
    // =========================================================================

    pub fn add_note(&mut self, block_id: &str, title: &str, content: &str) -> VaultResult<Note> {
        check_field(title, NOTE_TITLE_MAX_LEN, "Title")?;
        check_field(content, NOTE_CONTENT_MAX_LEN, "Content")?;

        self.mutate(|vault| {
            let note = Note {
                id: new_id(),
                block_id: vault.resolve_block_id(block_id),
                title: title.to_string(),
                content: content.to_string(),
            };
            vault.notes.push(note.clone());
            Ok(note)
        })
    }

    pub fn update_note(
        &mut self,
        id: &str,
        block_id: &str,
        title: &str,
        content: &str,
    ) -> VaultResult<Note> {
        check_field(title, NOTE_TITLE_MAX_LEN, "Title")?;
        check_field(content, NOTE_CONTENT_MAX_LEN, "Content")?;

        self.mutate(|vault| {
            let block_id = vault.resolve_block_id(block_id);
            let note = vault
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| VaultError::NotFound(format!("note {}", id)))?;
            note.block_id = block_id;
            note.title = title.to_string();
            note.content = content.to_string();
            Ok(note.clone())
        })
    }

    pub fn delete_note(&mut self, id: &str) -> VaultResult<()> {
        self.mutate(|vault| {
            let before = vault.notes.len();
            vault.notes.retain(|n| n.id != id);
            if vault.notes.len() == before {
                return Err(VaultError::NotFound(format!("note {}", id)));
            }
            Ok(())
        })
    }

    // =========================================================================
    // Identity presets
    // =========================================================================

    pub fn add_identity_preset(&mut self, draft: IdentityDraft) -> VaultResult<IdentityPreset> {
        for (value, field) in [
            (&draft.name, "Name"),
            (&draft.tax_id, "Tax id"),
            (&draft.birthdate, "Birthdate"),
            (&draft.email, "Email"),
            (&draft.profile_link, "Profile link"),
            (&draft.address, "Address"),
        ] {
            check_field(value, IDENTITY_FIELD_MAX_LEN, field)?;
        }

        let preset = draft.into_preset(new_id());
        let stored = preset.clone();
        self.mutate(move |vault| {
            vault.identity_presets.push(preset);
            Ok(())
        })?;
        Ok(stored)
    }

    pub fn delete_identity_preset(&mut self, id: &str) -> VaultResult<()> {
        self.mutate(|vault| {
            let before = vault.identity_presets.len();
            vault.identity_presets.retain(|p| p.id != id);
            if vault.identity_presets.len() == before {
                return Err(VaultError::NotFound(format!("identity preset {}", id)));
            }
            Ok(())
        })
    }

    // =========================================================================
    // Import / export
    // =========================================================================

    /// Export the vault in `format`.
    pub async fn export(&self, format: ExportFormat) -> VaultResult<ExportFile> {
        let mut snapshot = self.vault()?.clone();
        info!("Exporting vault as {}", format.label());
        let result = transfer::export(&snapshot, format, self.clock.now_ms()).await;
        snapshot.zeroize();
        result
    }

    /// Decode `bytes` (format detected from `file_name` and content) and
    /// apply them to the vault with `mode`, then persist.
    pub async fn import(
        &mut self,
        file_name: &str,
        bytes: &[u8],
        passphrase: Option<Passphrase>,
        mode: ImportMode,
    ) -> VaultResult<ImportSummary> {
        self.require_authenticated()?;

        let bundle = transfer::decode(file_name, bytes, passphrase).await?;
        let summary = self.mutate(|vault| transfer::apply(vault, bundle, mode))?;

        info!(
            "Imported {} credentials and {} notes",
            summary.credentials, summary.notes
        );
        Ok(summary)
    }
}

impl Drop for VaultManager {
    fn drop(&mut self) {
        if let Some(vault) = self.vault.as_mut() {
            vault.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{MemoryStore, SESSION_EXPIRY_KEY, VAULT_KEY};
    use crate::vault::session::MAX_SESSION_MS;

    const MINUTE: i64 = 60_000;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        manager: VaultManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let manager = VaultManager::new(store.clone(), clock.clone());
        Fixture {
            store,
            clock,
            manager,
        }
    }

    async fn created(passphrase: &str, session_ms: i64) -> Fixture {
        let mut fx = fixture();
        fx.manager
            .create(Passphrase::from(passphrase), session_ms)
            .await
            .unwrap();
        fx
    }

    #[tokio::test]
    async fn test_create_unlocks_with_default_block() {
        let fx = created("Tr0ub4dor&3", MINUTE).await;

        assert_eq!(fx.manager.status().unwrap(), VaultStatus::Unlocked);
        let vault = fx.manager.vault().unwrap();
        assert_eq!(vault.blocks, vec![Block::default_block()]);
        assert!(fx.store.get(VAULT_KEY).unwrap().is_some());
        assert!(fx.manager.has_valid_session().unwrap());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let mut fx = created("first pass", MINUTE).await;
        let result = fx.manager.create(Passphrase::from("second"), MINUTE).await;
        assert!(matches!(result, Err(VaultError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_open_without_vault_is_not_setup() {
        let mut fx = fixture();
        assert_eq!(fx.manager.status().unwrap(), VaultStatus::NotSetup);
        let result = fx.manager.open(Passphrase::from("anything"), MINUTE).await;
        assert!(matches!(result, Err(VaultError::NotSetup)));
    }

    #[tokio::test]
    async fn test_credential_survives_lock_and_open() {
        let mut fx = created("Tr0ub4dor&3", MINUTE).await;
        fx.manager
            .add_credential(DEFAULT_BLOCK_ID, "example.com", "alice", "p@ss".into())
            .unwrap();
        fx.manager.lock().unwrap();
        assert_eq!(fx.manager.status().unwrap(), VaultStatus::Locked);

        fx.manager
            .open(Passphrase::from("Tr0ub4dor&3"), MINUTE)
            .await
            .unwrap();
        let vault = fx.manager.vault().unwrap();
        assert_eq!(vault.credentials.len(), 1);
        let credential = &vault.credentials[0];
        assert_eq!(credential.site, "example.com");
        assert_eq!(credential.username, "alice");
        assert_eq!(credential.secret_value.expose(), "p@ss");
    }

    #[tokio::test]
    async fn test_wrong_passphrase_leaves_state_untouched() {
        let mut fx = created("Tr0ub4dor&3", MINUTE).await;
        fx.manager.lock().unwrap();
        let stored_before = fx.store.get(VAULT_KEY).unwrap();

        let result = fx.manager.open(Passphrase::from("wrong"), MINUTE).await;
        assert!(matches!(result, Err(VaultError::AuthFailure)));
        assert_eq!(fx.manager.status().unwrap(), VaultStatus::Locked);
        assert!(fx.manager.vault().is_err());
        assert_eq!(fx.store.get(VAULT_KEY).unwrap(), stored_before);
        assert_eq!(fx.store.get(SESSION_EXPIRY_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_tampered_store_is_auth_failure() {
        let mut fx = created("Tr0ub4dor&3", MINUTE).await;
        fx.manager.lock().unwrap();

        let raw = fx.store.get(VAULT_KEY).unwrap().unwrap();
        let mut record: StoredEnvelope = serde_json::from_str(&raw).unwrap();
        record.data.ciphertext[3] ^= 0x80;
        fx.store
            .set(VAULT_KEY, &serde_json::to_string(&record).unwrap())
            .unwrap();

        let result = fx.manager.open(Passphrase::from("Tr0ub4dor&3"), MINUTE).await;
        assert!(matches!(result, Err(VaultError::AuthFailure)));
    }

    #[tokio::test]
    async fn test_session_expiry_boundary() {
        let fx = created("passphrase", MINUTE).await;

        fx.clock.advance(MINUTE - 1);
        assert!(fx.manager.is_authenticated());
        fx.clock.advance(1);
        assert!(!fx.manager.is_authenticated());
        assert!(matches!(fx.manager.vault(), Err(VaultError::Locked)));
        assert_eq!(fx.manager.session_time_remaining(), 0);
    }

    #[tokio::test]
    async fn test_mutations_require_authentication() {
        let mut fx = created("passphrase", MINUTE).await;
        fx.clock.advance(MINUTE);

        assert!(matches!(
            fx.manager.add_block("Work"),
            Err(VaultError::Locked)
        ));
        assert!(matches!(fx.manager.save_vault(), Err(VaultError::Locked)));
        assert!(matches!(
            fx.manager.extend_session(30),
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_extend_session_algebra() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        fx.clock.advance(4 * MINUTE);

        fx.manager.extend_session(30).unwrap();
        assert_eq!(fx.manager.session_time_remaining(), 36 * MINUTE);

        fx.manager.extend_session(30).unwrap();
        assert_eq!(fx.manager.session_time_remaining(), MAX_SESSION_MS);

        let marker = fx.store.get(SESSION_EXPIRY_KEY).unwrap().unwrap();
        assert_eq!(
            marker.parse::<i64>().unwrap(),
            fx.clock.now_ms() + MAX_SESSION_MS
        );
    }

    #[tokio::test]
    async fn test_re_authenticate_after_expiry() {
        let mut fx = created("passphrase", 30 * MINUTE).await;
        fx.manager.add_block("Work").unwrap();
        fx.clock.advance(30 * MINUTE);
        assert!(!fx.manager.is_authenticated());

        let result = fx.manager.re_authenticate(Passphrase::from("nope")).await;
        assert!(matches!(result, Err(VaultError::AuthFailure)));
        assert!(!fx.manager.is_authenticated());

        fx.manager
            .re_authenticate(Passphrase::from("passphrase"))
            .await
            .unwrap();
        assert!(fx.manager.is_authenticated());
        // Fixed short session, not the original 30 minutes
        assert_eq!(fx.manager.session_time_remaining(), REAUTH_SESSION_MS);
        // In-memory vault kept
        assert_eq!(fx.manager.vault().unwrap().blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_re_authenticate_requires_loaded_vault() {
        let mut fx = created("passphrase", MINUTE).await;
        fx.manager.lock().unwrap();
        let result = fx.manager.re_authenticate(Passphrase::from("passphrase")).await;
        assert!(matches!(result, Err(VaultError::Locked)));
    }

    #[tokio::test]
    async fn test_lock_scrubs_and_clears_marker() {
        let mut fx = created("passphrase", MINUTE).await;
        fx.manager.lock().unwrap();

        assert!(!fx.manager.is_authenticated());
        assert!(fx.manager.vault.is_none());
        assert!(fx.manager.key.is_none());
        assert_eq!(fx.store.get(SESSION_EXPIRY_KEY).unwrap(), None);
        // Lock is valid from any state
        fx.manager.lock().unwrap();
    }

    #[tokio::test]
    async fn test_lock_if_expired() {
        let mut fx = created("passphrase", MINUTE).await;
        assert!(!fx.manager.lock_if_expired().unwrap());

        fx.clock.advance(MINUTE);
        assert!(fx.manager.lock_if_expired().unwrap());
        assert!(fx.manager.vault.is_none());
        assert!(!fx.manager.lock_if_expired().unwrap());
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_before_kdf() {
        let mut fx = created("passphrase", MINUTE).await;
        fx.manager.lock().unwrap();

        for _ in 0..5 {
            let result = fx.manager.open(Passphrase::from("wrong"), MINUTE).await;
            assert!(matches!(result, Err(VaultError::AuthFailure)));
        }
        let result = fx.manager.open(Passphrase::from("passphrase"), MINUTE).await;
        assert!(matches!(result, Err(VaultError::RateLimited)));

        fx.clock.advance(MINUTE + 1);
        fx.manager
            .open(Passphrase::from("passphrase"), MINUTE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unsafe_passphrase_rejected() {
        let mut fx = fixture();
        let result = fx
            .manager
            .create(Passphrase::from("<script>"), MINUTE)
            .await;
        assert!(matches!(result, Err(VaultError::InvalidInput(_))));
        assert!(!fx.manager.exists().unwrap());

        let result = fx.manager.create(Passphrase::from(""), MINUTE).await;
        assert!(matches!(result, Err(VaultError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_delete_block_cascades() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        let work = fx.manager.add_block("Work").unwrap();
        fx.manager
            .add_credential(&work.id, "corp.example", "bob", "x".into())
            .unwrap();
        fx.manager.add_note(&work.id, "Wifi", "hunter2").unwrap();
        fx.manager
            .add_credential(DEFAULT_BLOCK_ID, "home.example", "bob", "y".into())
            .unwrap();

        fx.manager.delete_block(&work.id).unwrap();
        let vault = fx.manager.vault().unwrap();
        assert!(!vault.has_block(&work.id));
        assert_eq!(vault.credentials.len(), 1);
        assert_eq!(vault.credentials[0].site, "home.example");
        assert!(vault.notes.is_empty());

        assert!(matches!(
            fx.manager.delete_block(DEFAULT_BLOCK_ID),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.manager.delete_block(&work.id),
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_block_falls_back_to_default() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        let credential = fx
            .manager
            .add_credential("nowhere", "a.example", "u", "s".into())
            .unwrap();
        assert_eq!(credential.block_id, DEFAULT_BLOCK_ID);

        let note = fx.manager.add_note("nowhere", "t", "c").unwrap();
        assert_eq!(note.block_id, DEFAULT_BLOCK_ID);
    }

    #[tokio::test]
    async fn test_invalid_fields_are_not_persisted() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        let before = fx.store.get(VAULT_KEY).unwrap();

        let result = fx.manager.add_credential(
            DEFAULT_BLOCK_ID,
            "<img src=x onerror=alert(1)>",
            "u",
            "s".into(),
        );
        assert!(matches!(result, Err(VaultError::InvalidInput(_))));
        assert!(fx.manager.add_block(&"x".repeat(51)).is_err());
        assert_eq!(fx.store.get(VAULT_KEY).unwrap(), before);
        assert!(fx.manager.vault().unwrap().credentials.is_empty());
    }

    #[tokio::test]
    async fn test_note_update_and_delete() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        let note = fx.manager.add_note(DEFAULT_BLOCK_ID, "Todo", "milk").unwrap();

        let updated = fx
            .manager
            .update_note(&note.id, DEFAULT_BLOCK_ID, "Todo", "milk, eggs")
            .unwrap();
        assert_eq!(updated.id, note.id);
        assert_eq!(fx.manager.notes_in(DEFAULT_BLOCK_ID).unwrap()[0].content, "milk, eggs");

        fx.manager.delete_note(&note.id).unwrap();
        assert!(matches!(
            fx.manager.delete_note(&note.id),
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_identity_presets() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        let preset = fx
            .manager
            .add_identity_preset(IdentityDraft {
                name: "Ana Souza".into(),
                tax_id: "123.456.789-09".into(),
                birthdate: "1990-02-03".into(),
                email: "ana@example.com".into(),
                profile_link: "https://example.com/ana".into(),
                address: "Rua A, 1".into(),
            })
            .unwrap();
        assert_eq!(fx.manager.vault().unwrap().identity_presets, vec![preset.clone()]);

        fx.manager.delete_identity_preset(&preset.id).unwrap();
        assert!(fx.manager.vault().unwrap().identity_presets.is_empty());
    }

    #[tokio::test]
    async fn test_open_runs_legacy_migration() {
        let mut fx = created("passphrase", MINUTE).await;

        // Rewrite the stored vault as a version 1 vault with demo content
        let mut legacy = Vault::new();
        legacy.version = 1;
        legacy.blocks.push(Block {
            id: "sqli".into(),
            name: "SQLi".into(),
        });
        legacy.notes.push(Note {
            id: "note_sqli_0_1".into(),
            block_id: "sqli".into(),
            title: "Payload".into(),
            content: "' OR 1=1".into(),
        });
        fx.manager.vault = Some(legacy);
        fx.manager.save_vault().unwrap();
        fx.manager.lock().unwrap();

        fx.manager
            .open(Passphrase::from("passphrase"), MINUTE)
            .await
            .unwrap();
        let vault = fx.manager.vault().unwrap();
        assert_eq!(vault.version, 2);
        assert!(!vault.has_block("sqli"));
        assert_eq!(vault.notes[0].block_id, DEFAULT_BLOCK_ID);
    }

    #[tokio::test]
    async fn test_open_accepts_original_record_shape() {
        let mut fx = fixture();

        // Short field names, `iv`/`data` envelope, as older builds wrote it
        let salt = security::generate_salt();
        let key = security::derive_key_blocking(&Passphrase::from("pass"), &salt).unwrap();
        let legacy = serde_json::json!({
            "blks": [
                {"id": "default", "name": "General"},
                {"id": "xss", "name": "XSS"},
                {"id": "work", "name": "Work"}
            ],
            "pwds": [
                {"id": "p1", "blk": "work", "site": "mail.example", "usr": "ana", "val": "hunter2"},
                {"id": "p2", "blk": "xss", "site": "demo", "usr": "demo", "val": "demo"}
            ],
            "notes": [
                {"id": "n1", "blk": "xss", "title": "Payload", "content": "<svg>"}
            ]
        });
        let envelope = security::seal(&legacy, &key, 1).unwrap();
        let record = serde_json::json!({
            "salt": salt.to_vec(),
            "data": {
                "iv": envelope.nonce,
                "aad": envelope.aad,
                "data": envelope.ciphertext,
            },
            "timestamp": 1,
        });
        fx.store.set(VAULT_KEY, &record.to_string()).unwrap();

        fx.manager
            .open(Passphrase::from("pass"), MINUTE)
            .await
            .unwrap();
        let vault = fx.manager.vault().unwrap();
        assert_eq!(vault.version, 2);
        assert!(!vault.has_block("xss"));
        assert_eq!(vault.credentials.len(), 1);
        assert_eq!(vault.credentials[0].username, "ana");
        assert_eq!(vault.credentials[0].secret_value.expose(), "hunter2");
        assert_eq!(vault.notes[0].block_id, DEFAULT_BLOCK_ID);
    }

    #[tokio::test]
    async fn test_stored_aad_timestamp_follows_clock() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        fx.clock.advance(MINUTE);
        fx.manager.add_block("Work").unwrap();

        let record = read_envelope(fx.store.as_ref()).unwrap().unwrap();
        let header = record.data.header().unwrap();
        assert_eq!(header.timestamp, fx.clock.now_ms());
        assert_eq!(record.timestamp, fx.clock.now_ms());
    }

    #[tokio::test]
    async fn test_expired_marker_removed_on_startup() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(10_000));
        store.set(SESSION_EXPIRY_KEY, "5000").unwrap();

        let manager = VaultManager::new(store.clone(), clock);
        assert!(!manager.has_valid_session().unwrap());
        assert_eq!(store.get(SESSION_EXPIRY_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_protected_export_merges_into_fresh_vault() {
        let mut source = created("source pass", 10 * MINUTE).await;
        let work = source.manager.add_block("Work").unwrap();
        source
            .manager
            .add_credential(&work.id, "corp.example", "bob", "pw-1".into())
            .unwrap();
        source
            .manager
            .add_note(DEFAULT_BLOCK_ID, "Recovery", "codes in the safe")
            .unwrap();

        let file = source
            .manager
            .export(ExportFormat::ProtectedJson {
                passphrase: Passphrase::from("backupKey1"),
            })
            .await
            .unwrap();

        let mut target = created("target pass", 10 * MINUTE).await;
        let result = target
            .manager
            .import(&file.file_name, &file.bytes, Some("wrong".into()), ImportMode::Merge)
            .await;
        assert!(matches!(result, Err(VaultError::AuthFailure)));
        assert!(target.manager.vault().unwrap().credentials.is_empty());

        let summary = target
            .manager
            .import(
                &file.file_name,
                &file.bytes,
                Some("backupKey1".into()),
                ImportMode::Merge,
            )
            .await
            .unwrap();
        assert_eq!(summary.credentials, 1);
        assert_eq!(summary.notes, 1);
        assert_eq!(summary.blocks, 1);

        // Persisted: survives a lock and reopen of the target vault
        target.manager.lock().unwrap();
        target
            .manager
            .open(Passphrase::from("target pass"), MINUTE)
            .await
            .unwrap();
        let vault = target.manager.vault().unwrap();
        let imported = &vault.credentials[0];
        assert_ne!(imported.id, source.manager.vault().unwrap().credentials[0].id);
        assert_eq!(vault.block_name(&imported.block_id), "Work");
        assert_eq!(imported.secret_value.expose(), "pw-1");
    }

    #[tokio::test]
    async fn test_replace_import_needs_confirmation() {
        let mut fx = created("passphrase", 10 * MINUTE).await;
        fx.manager
            .add_credential(DEFAULT_BLOCK_ID, "keep.example", "u", "s".into())
            .unwrap();
        let csv = b"Block,Site,Username,Secret\nGeneral,new.example,me,pw\n";

        let result = fx
            .manager
            .import("in.csv", csv, None, ImportMode::Replace { confirmed: false })
            .await;
        assert!(matches!(result, Err(VaultError::ConfirmationRequired)));
        assert_eq!(fx.manager.vault().unwrap().credentials[0].site, "keep.example");

        fx.manager
            .import("in.csv", csv, None, ImportMode::Replace { confirmed: true })
            .await
            .unwrap();
        let vault = fx.manager.vault().unwrap();
        assert_eq!(vault.credentials.len(), 1);
        assert_eq!(vault.credentials[0].site, "new.example");
    }

    #[tokio::test]
    async fn test_export_requires_session() {
        let fx = created("passphrase", MINUTE).await;
        fx.clock.advance(MINUTE);
        let result = fx.manager.export(ExportFormat::PlainJson).await;
        assert!(matches!(result, Err(VaultError::Locked)));
    }

    #[tokio::test]
    async fn test_destroy_returns_to_not_setup() {
        let mut fx = created("passphrase", MINUTE).await;
        fx.manager.destroy().unwrap();
        assert_eq!(fx.manager.status().unwrap(), VaultStatus::NotSetup);
        fx.manager
            .create(Passphrase::from("fresh"), MINUTE)
            .await
            .unwrap();
    }
}
