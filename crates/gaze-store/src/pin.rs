//! Salted, iterated PIN hashing (PBKDF2-HMAC-SHA256).
//!
//! The record is stored as plaintext JSON; the iteration count is what
//! protects a 4-digit secret. Comparison is constant-time.

use crate::error::StorageError;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const PIN_LEN: usize = 4;
pub const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 32;
const HASH_LEN: usize = 32;

/// Persisted `{salt, hash}` pair, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub salt: String,
    pub hash: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_iterations() -> u32 {
    PBKDF2_ITERATIONS
}

/// A PIN is exactly four ASCII digits.
pub fn validate_pin(pin: &str) -> Result<(), StorageError> {
    if pin.len() == PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(StorageError::InvalidPin)
    }
}

impl PinRecord {
    /// Hash `pin` under a fresh random salt.
    pub fn derive(pin: &str) -> Result<Self, StorageError> {
        Self::derive_with_iterations(pin, PBKDF2_ITERATIONS)
    }

    pub(crate) fn derive_with_iterations(pin: &str, iterations: u32) -> Result<Self, StorageError> {
        validate_pin(pin)?;
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = hash_pin(pin, &salt, iterations);
        Ok(Self {
            salt: hex::encode(salt),
            hash: hex::encode(hash),
            iterations,
        })
    }

    /// Re-derive with the stored salt and compare in constant time.
    ///
    /// Returns `None` when the record itself is malformed.
    pub fn verify(&self, candidate: &str) -> Option<bool> {
        let salt = hex::decode(&self.salt).ok()?;
        let stored = hex::decode(&self.hash).ok()?;
        if salt.is_empty() || stored.len() != HASH_LEN || self.iterations == 0 {
            return None;
        }
        let derived = hash_pin(candidate, &salt, self.iterations);
        Some(bool::from(derived[..].ct_eq(&stored[..])))
    }
}

fn hash_pin(pin: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, iterations, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 1_000;

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("0427").is_ok());
        for bad in ["", "123", "12345", "12a4", "１２３４", " 123"] {
            assert!(matches!(validate_pin(bad), Err(StorageError::InvalidPin)), "{bad:?}");
        }
    }

    #[test]
    fn test_verify_correct_and_wrong() {
        let record = PinRecord::derive_with_iterations("0427", FAST).unwrap();
        assert_eq!(record.verify("0427"), Some(true));
        assert_eq!(record.verify("0428"), Some(false));
        assert_eq!(record.verify(""), Some(false));
    }

    #[test]
    fn test_salt_is_fresh_per_derive() {
        let a = PinRecord::derive_with_iterations("1111", FAST).unwrap();
        let b = PinRecord::derive_with_iterations("1111", FAST).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
        assert_eq!(a.salt.len(), SALT_LEN * 2);
    }

    #[test]
    fn test_malformed_record() {
        let mut record = PinRecord::derive_with_iterations("1111", FAST).unwrap();
        record.hash = "zz".into();
        assert_eq!(record.verify("1111"), None);
    }

    #[test]
    fn test_known_vector() {
        // RFC 7914 §11 PBKDF2-HMAC-SHA256 test vector, 1 iteration
        let out = {
            let mut out = [0u8; 64];
            pbkdf2::pbkdf2_hmac::<Sha256>(b"passwd", b"salt", 1, &mut out);
            out
        };
        assert_eq!(&hex::encode(out)[..32], "55ac046e56e3089fec1691c22544b605");
    }

    #[test]
    fn test_default_iterations_when_field_missing() {
        let record: PinRecord = serde_json::from_str(r#"{"salt":"00","hash":"00"}"#).unwrap();
        assert_eq!(record.iterations, PBKDF2_ITERATIONS);
    }
}
