use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::security::{self, Passphrase};
use crate::storage::{load_settings, save_settings, AppSettings, KeyValueStore};
use crate::vault::{VaultManager, VaultResult, VaultStatus};

/// How often the session watcher checks for expiry.
pub const SESSION_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Shared application state.
///
/// Every vault operation goes through the one `VaultManager` mutex, so a
/// save always completes before the next mutation starts.
pub struct AppState {
    pub settings: Arc<RwLock<AppSettings>>,
    /// The vault lifecycle. Held for the whole of each operation, including
    /// awaited key derivation.
    pub vault: Arc<Mutex<VaultManager>>,
    store: Arc<dyn KeyValueStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: Arc::new(RwLock::new(AppSettings::default())),
            vault: Arc::new(Mutex::new(VaultManager::new(store.clone(), clock))),
            store,
        }
    }

    /// Run the crypto self-test and load settings. A failing self-test is
    /// fatal: no vault operation is attempted.
    pub fn initialize(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        security::self_test().map_err(|e| AppError::SelfTest(e.to_string()))?;
        debug!("Crypto self-test passed");

        let settings = load_settings(store.as_ref())?;
        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            ..Self::new(store, clock)
        })
    }

    pub async fn status(&self) -> VaultResult<VaultStatus> {
        self.vault.lock().await.status()
    }

    /// Create the vault with the configured (optionally extended) session.
    pub async fn create_vault(&self, passphrase: Passphrase, extended: bool) -> Result<()> {
        let duration = self.settings.read().await.session_duration(extended);
        let mut vault = self.vault.lock().await;
        vault.create(passphrase, duration).await?;
        Ok(())
    }

    pub async fn open_vault(&self, passphrase: Passphrase, extended: bool) -> Result<()> {
        let duration = self.settings.read().await.session_duration(extended);
        let mut vault = self.vault.lock().await;
        vault.open(passphrase, duration).await?;
        Ok(())
    }

    pub async fn re_authenticate(&self, passphrase: Passphrase) -> Result<()> {
        self.vault.lock().await.re_authenticate(passphrase).await?;
        Ok(())
    }

    pub async fn lock_vault(&self) -> Result<()> {
        self.vault.lock().await.lock()?;
        Ok(())
    }

    /// Run `f` against the vault while holding the lock.
    pub async fn with_vault<T>(
        &self,
        f: impl FnOnce(&mut VaultManager) -> VaultResult<T>,
    ) -> Result<T> {
        let mut vault = self.vault.lock().await;
        Ok(f(&mut vault)?)
    }

    pub async fn update_settings(&self, settings: AppSettings) -> Result<()> {
        save_settings(self.store.as_ref(), &settings)?;
        *self.settings.write().await = settings;
        info!("Settings updated");
        Ok(())
    }

    /// Poll `lock_if_expired` every `interval` until the state is dropped.
    pub fn spawn_session_watch(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.vault);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let Some(vault) = weak.upgrade() else {
                    debug!("Session watch stopping");
                    break;
                };
                let result = vault.lock().await.lock_if_expired();
                match result {
                    Ok(true) => info!("Vault locked after session expiry"),
                    Ok(false) => {}
                    Err(e) => warn!("Session watch failed to lock vault: {}", e),
                }
            }
        })
    }
}
