//! Symmetric key management.
//!
//! The key is 32 random bytes in an owner-only file next to the data it
//! protects. There is no recovery path: losing the key file makes the
//! encrypted templates unreadable, which surfaces as `CorruptOrTampered`.

use crate::error::StorageError;
use crate::fsutil;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;

pub const KEY_LEN: usize = 32;

/// Load the key at `path`, generating and persisting a new one on first use.
pub fn load_or_create(path: &Path) -> Result<[u8; KEY_LEN], StorageError> {
    if let Some(bytes) = fsutil::read_optional(path)? {
        if bytes.len() != KEY_LEN {
            return Err(StorageError::InvalidKey {
                path: path.to_path_buf(),
                expected: KEY_LEN,
                found: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        tracing::debug!(path = %path.display(), "loaded storage key");
        return Ok(key);
    }

    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    fsutil::write_atomic(path, &key)?;
    tracing::info!(path = %path.display(), "generated new storage key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_created_once_then_reused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".key");

        let first = load_or_create(&path).unwrap();
        let second = load_or_create(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&path).unwrap().len(), KEY_LEN);
    }

    #[test]
    fn test_truncated_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".key");
        std::fs::write(&path, [1u8; 7]).unwrap();

        let err = load_or_create(&path).unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { found: 7, .. }));
    }
}
