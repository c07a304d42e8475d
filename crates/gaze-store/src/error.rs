use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Authenticated decryption failed or the payload is malformed.
    ///
    /// Never downgraded to an empty store: this is how a tampered file or a
    /// lost key shows up.
    #[error("{path}: stored data is corrupt or has been tampered with")]
    CorruptOrTampered { path: PathBuf },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("PIN must be exactly 4 digits")]
    InvalidPin,
    #[error("key file {path} is invalid: expected {expected} bytes, found {found}")]
    InvalidKey {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("encryption failed")]
    Encryption,
    #[error("unknown config key '{0}'")]
    UnknownConfigKey(String),
    #[error("invalid value for config key '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>) -> Self {
        StorageError::CorruptOrTampered { path: path.into() }
    }
}
