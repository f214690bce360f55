//! Authenticated encryption of serialized vault payloads.
//!
//! Values are serialized to JSON and sealed with AES-256-GCM using a fresh
//! random 16-byte nonce and additional authenticated data that records the
//! format version and the sealing time. Opening fails with the single
//! [`VaultError::AuthFailure`] for every kind of mismatch.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::kdf::VaultKey;
use crate::vault::{VaultError, VaultResult};

/// Nonce size (128 bits).
pub const NONCE_LEN: usize = 16;

/// Authentication tag size (128 bits).
pub const TAG_LEN: usize = 16;

/// Format tag bound into every envelope's AAD.
pub const FORMAT_VERSION: &str = "VAULT_V1";

/// AES-256-GCM with a 16-byte nonce and the default 16-byte tag.
type VaultCipher = AesGcm<Aes256, U16>;

/// Output of [`seal`]: everything needed to authenticate and decrypt.
///
/// Older records name the fields `iv`/`data` and may omit `aad`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(alias = "iv")]
    pub nonce: Vec<u8>,
    #[serde(default)]
    pub aad: Vec<u8>,
    #[serde(alias = "data")]
    pub ciphertext: Vec<u8>,
}

/// Decoded additional authenticated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AadHeader {
    pub version: String,
    pub timestamp: i64,
    pub context: String,
}

impl Envelope {
    /// Parse the AAD. Only meaningful after a successful [`open`].
    pub fn header(&self) -> Option<AadHeader> {
        serde_json::from_slice(&self.aad).ok()
    }
}

fn cipher_for(key: &VaultKey) -> VaultResult<VaultCipher> {
    VaultCipher::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Invalid key: {}", e)))
}

/// Seal raw bytes under `key` with the given AAD context label, stamped
/// with `now_ms`.
pub(crate) fn seal_bytes(
    plaintext: &[u8],
    key: &VaultKey,
    context: &str,
    now_ms: i64,
) -> VaultResult<Envelope> {
    let header = AadHeader {
        version: FORMAT_VERSION.to_string(),
        timestamp: now_ms,
        context: context.to_string(),
    };
    let aad = serde_json::to_vec(&header)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

    let cipher = cipher_for(key)?;
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok(Envelope {
        nonce: nonce_bytes.to_vec(),
        aad,
        ciphertext,
    })
}

/// Authenticate and decrypt raw bytes.
pub(crate) fn open_bytes(envelope: &Envelope, key: &VaultKey) -> VaultResult<Zeroizing<Vec<u8>>> {
    if envelope.nonce.len() != NONCE_LEN || envelope.ciphertext.len() < TAG_LEN {
        return Err(VaultError::AuthFailure);
    }

    let nonce = Nonce::<U16>::from_slice(&envelope.nonce);
    let cipher = cipher_for(key)?;

    // Wrong key, tampered ciphertext and tampered AAD are indistinguishable here
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &envelope.ciphertext,
                aad: &envelope.aad,
            },
        )
        .map_err(|_| VaultError::AuthFailure)?;

    Ok(Zeroizing::new(plaintext))
}

/// Serialize `value` and seal it. `now_ms` goes into the AAD timestamp.
pub fn seal<T: Serialize>(value: &T, key: &VaultKey, now_ms: i64) -> VaultResult<Envelope> {
    let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
    seal_bytes(&plaintext, key, "encryption", now_ms)
}

/// Authenticate, decrypt and deserialize an envelope.
pub fn open<T: DeserializeOwned>(envelope: &Envelope, key: &VaultKey) -> VaultResult<T> {
    let plaintext = open_bytes(envelope, key)?;
    serde_json::from_slice(&plaintext).map_err(|_| VaultError::AuthFailure)
}

/// Known-answer round trip and tamper check, run once at startup.
///
/// A failure here means the crypto primitives are unusable and no vault
/// operation should be attempted.
pub fn self_test() -> VaultResult<()> {
    let key = VaultKey::from_bytes([0x42; 32]);
    let probe = "vaultkeep self-test".to_string();

    let envelope = seal(&probe, &key, 1)?;
    if envelope.nonce.len() != NONCE_LEN || envelope.ciphertext.len() < TAG_LEN {
        return Err(VaultError::Encryption("Self-test produced a malformed envelope".into()));
    }

    let decoded: String = open(&envelope, &key)
        .map_err(|e| VaultError::Encryption(format!("Self-test round trip failed: {}", e)))?;
    if decoded != probe {
        return Err(VaultError::Encryption("Self-test round trip mismatch".into()));
    }

    let mut tampered = envelope.clone();
    tampered.ciphertext[0] ^= 0x01;
    if open::<String>(&tampered, &key).is_ok() {
        return Err(VaultError::Encryption("Self-test accepted tampered data".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const NOW: i64 = 1_700_000_000_000;

    fn key(byte: u8) -> VaultKey {
        VaultKey::from_bytes([byte; 32])
    }

    fn sample() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("site".to_string(), "example.com".to_string());
        map.insert("secret".to_string(), "p@ss".to_string());
        map
    }

    #[test]
    fn test_seal_open_round_trip() {
        let value = sample();
        let envelope = seal(&value, &key(1), NOW).unwrap();
        let decoded: BTreeMap<String, String> = open(&envelope, &key(1)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = seal(&sample(), &key(1), NOW).unwrap();
        assert_eq!(envelope.nonce.len(), NONCE_LEN);

        let header = envelope.header().unwrap();
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.context, "encryption");
        assert_eq!(header.timestamp, NOW);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let a = seal(&sample(), &key(1), NOW).unwrap();
        let b = seal(&sample(), &key(1), NOW).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_is_auth_failure() {
        let envelope = seal(&sample(), &key(1), NOW).unwrap();
        let result: VaultResult<BTreeMap<String, String>> = open(&envelope, &key(2));
        assert!(matches!(result, Err(VaultError::AuthFailure)));
    }

    #[test]
    fn test_single_bit_flips_are_detected() {
        let envelope = seal(&sample(), &key(1), NOW).unwrap();

        for field in 0..3 {
            let len = match field {
                0 => envelope.nonce.len(),
                1 => envelope.aad.len(),
                _ => envelope.ciphertext.len(),
            };
            for index in 0..len {
                let mut tampered = envelope.clone();
                let bytes = match field {
                    0 => &mut tampered.nonce,
                    1 => &mut tampered.aad,
                    _ => &mut tampered.ciphertext,
                };
                bytes[index] ^= 1 << (index % 8);

                let result: VaultResult<BTreeMap<String, String>> = open(&tampered, &key(1));
                assert!(
                    matches!(result, Err(VaultError::AuthFailure)),
                    "field {} byte {} flip was not detected",
                    field,
                    index
                );
            }
        }
    }

    #[test]
    fn test_truncated_envelope_is_auth_failure() {
        let envelope = seal(&sample(), &key(1), NOW).unwrap();

        let mut short_ct = envelope.clone();
        short_ct.ciphertext.truncate(TAG_LEN - 1);
        assert!(matches!(
            open::<BTreeMap<String, String>>(&short_ct, &key(1)),
            Err(VaultError::AuthFailure)
        ));

        let mut short_nonce = envelope.clone();
        short_nonce.nonce.pop();
        assert!(matches!(
            open::<BTreeMap<String, String>>(&short_nonce, &key(1)),
            Err(VaultError::AuthFailure)
        ));

        let mut dropped_tail = envelope;
        dropped_tail.ciphertext.pop();
        assert!(matches!(
            open::<BTreeMap<String, String>>(&dropped_tail, &key(1)),
            Err(VaultError::AuthFailure)
        ));
    }

    #[test]
    fn test_legacy_field_names_decode() {
        let envelope = seal(&sample(), &key(1), NOW).unwrap();
        let legacy = serde_json::json!({
            "iv": envelope.nonce,
            "aad": envelope.aad,
            "data": envelope.ciphertext,
        });

        let parsed: Envelope = serde_json::from_value(legacy).unwrap();
        assert_eq!(parsed, envelope);
        let decoded: BTreeMap<String, String> = open(&parsed, &key(1)).unwrap();
        assert_eq!(decoded, sample());

        // A record without AAD parses; it only opens if sealed without one
        let bare: Envelope = serde_json::from_value(serde_json::json!({
            "iv": envelope.nonce,
            "data": envelope.ciphertext,
        }))
        .unwrap();
        assert!(bare.aad.is_empty());
        assert!(matches!(
            open::<BTreeMap<String, String>>(&bare, &key(1)),
            Err(VaultError::AuthFailure)
        ));
    }

    #[test]
    fn test_self_test_passes() {
        self_test().unwrap();
    }
}
