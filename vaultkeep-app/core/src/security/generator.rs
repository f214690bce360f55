//! Random password generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::vault::model::SecretString;
use crate::vault::{VaultError, VaultResult};

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

pub const MIN_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub length: usize,
    pub upper: bool,
    pub lower: bool,
    pub digits: bool,
    pub symbols: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            length: 16,
            upper: true,
            lower: true,
            digits: true,
            symbols: true,
        }
    }
}

/// Generate a password drawing uniformly from the selected character classes.
pub fn generate(options: &GeneratorOptions) -> VaultResult<SecretString> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&options.length) {
        return Err(VaultError::InvalidInput(format!(
            "Password length must be between {} and {}",
            MIN_LENGTH, MAX_LENGTH
        )));
    }

    let mut charset: Vec<char> = Vec::new();
    for (enabled, chars) in [
        (options.upper, UPPER),
        (options.lower, LOWER),
        (options.digits, DIGITS),
        (options.symbols, SYMBOLS),
    ] {
        if enabled {
            charset.extend(chars.chars());
        }
    }
    if charset.is_empty() {
        return Err(VaultError::InvalidInput(
            "Select at least one character class".into(),
        ));
    }

    let mut rng = rand::rng();
    let password: String = (0..options.length)
        .map(|_| charset[rng.random_range(0..charset.len())])
        .collect();

    Ok(SecretString::new(password))
}
