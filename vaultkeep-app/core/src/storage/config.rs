use serde::{Deserialize, Serialize};

use super::{KeyValueStore, CONFIG_KEY};
use crate::error::{AppError, Result};
use crate::vault::MAX_SESSION_MS;

/// Non-secret preferences, stored in plaintext under the `config` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Session length for a normal login.
    pub session_duration_ms: i64,
    /// Session length when the user asks to stay signed in longer.
    pub extended_session_ms: i64,
    /// E-mail service used by the identity generator.
    #[serde(alias = "emailSvc")]
    pub email_service: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            session_duration_ms: 60_000,
            extended_session_ms: 30 * 60_000,
            email_service: "tuamae".to_string(),
        }
    }
}

impl AppSettings {
    pub fn session_duration(&self, extended: bool) -> i64 {
        if extended {
            self.extended_session_ms
        } else {
            self.session_duration_ms
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sessionDurationMs", self.session_duration_ms),
            ("extendedSessionMs", self.extended_session_ms),
        ] {
            if value <= 0 || value > MAX_SESSION_MS {
                return Err(AppError::Config(format!(
                    "{} must be between 1 and {} ms, got {}",
                    name, MAX_SESSION_MS, value
                )));
            }
        }
        if self.email_service.trim().is_empty() {
            return Err(AppError::Config("emailService must not be empty".into()));
        }
        Ok(())
    }
}

pub fn load_settings(store: &dyn KeyValueStore) -> Result<AppSettings> {
    let Some(content) = store.get(CONFIG_KEY)? else {
        return Ok(AppSettings::default());
    };

    let settings: AppSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &AppSettings) -> Result<()> {
    settings.validate()?;
    let content = serde_json::to_string_pretty(settings)?;
    store.set(CONFIG_KEY, &content)?;
    Ok(())
}
