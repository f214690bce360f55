use thiserror::Error;

use crate::vault::VaultError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto self-test failed: {0}")]
    SelfTest(String),
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            // Keep the structured {code, message} shape for vault errors
            AppError::Vault(e) => e.serialize(serializer),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_errors_keep_structured_shape() {
        let json = serde_json::to_value(AppError::from(VaultError::Locked)).unwrap();
        assert_eq!(json["code"], "LOCKED");

        let json = serde_json::to_value(AppError::SelfTest("bad tag".into())).unwrap();
        assert_eq!(json, "Crypto self-test failed: bad tag");
    }
}
