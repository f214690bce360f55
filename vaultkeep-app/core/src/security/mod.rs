mod crypto;
mod generator;
mod kdf;
mod validation;

pub use crypto::{open, seal, self_test, AadHeader, Envelope, FORMAT_VERSION, NONCE_LEN, TAG_LEN};
pub use generator::{generate, GeneratorOptions};
pub use kdf::{
    derive_key, derive_key_blocking, generate_salt, Passphrase, Salt, VaultKey, KEY_LEN,
    PBKDF2_ITERATIONS, SALT_LEN,
};
pub use validation::{validate, RateLimiter, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_MS};
