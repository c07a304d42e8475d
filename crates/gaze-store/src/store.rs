//! The secure credential store: one private directory holding the encrypted
//! templates, the PIN record, the settings, the attempt counter and the key.

use crate::attempts::AttemptRecord;
use crate::cipher::TemplateCipher;
use crate::config::AuthConfig;
use crate::error::StorageError;
use crate::fsutil;
use crate::keyfile;
use crate::pin::{self, PinRecord};
use chrono::Utc;
use gaze_core::Identity;
use std::path::{Path, PathBuf};

pub const TEMPLATES_FILE: &str = "embeddings.enc";
pub const PIN_FILE: &str = "pin.json";
pub const CONFIG_FILE: &str = "config.json";
pub const ATTEMPTS_FILE: &str = "attempts.json";
pub const KEY_FILE: &str = ".key";

/// PIN accepted while no PIN has been configured.
///
/// A first-run convenience that weakens security until a real PIN is set;
/// every use is logged at `warn`. Disable with
/// [`SecureCredentialStore::without_default_pin`].
pub const DEFAULT_PIN: &str = "1234";

/// Snapshot of what the store currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub data_dir: PathBuf,
    pub identities: usize,
    pub pin_set: bool,
    pub first_time_setup: bool,
}

/// Encrypted-at-rest persistence for identities, PIN and settings.
///
/// Writes are atomic (temp file + rename) and owner-only. One store instance
/// is meant to be driven by one session at a time.
pub struct SecureCredentialStore {
    dir: PathBuf,
    cipher: TemplateCipher,
    default_pin: Option<&'static str>,
}

impl SecureCredentialStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fsutil::ensure_private_dir(&dir)?;
        let key = keyfile::load_or_create(&dir.join(KEY_FILE))?;
        tracing::info!(dir = %dir.display(), "credential store opened");

        Ok(Self {
            dir,
            cipher: TemplateCipher::new(&key),
            default_pin: Some(DEFAULT_PIN),
        })
    }

    /// Refuse every PIN until one has been saved.
    pub fn without_default_pin(mut self) -> Self {
        self.default_pin = None;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    // --- Templates ---

    /// Encrypt and persist the full identity set.
    pub fn save_templates(&self, identities: &[Identity]) -> Result<(), StorageError> {
        let path = self.path(TEMPLATES_FILE);
        let plaintext = serde_json::to_vec(identities)?;
        let sealed = self.cipher.seal(&plaintext)?;
        fsutil::write_atomic(&path, &sealed)?;
        tracing::info!(count = identities.len(), "saved face templates (encrypted)");
        Ok(())
    }

    /// Load and decrypt the identity set; empty if nothing was saved yet.
    pub fn load_templates(&self) -> Result<Vec<Identity>, StorageError> {
        let path = self.path(TEMPLATES_FILE);
        let Some(sealed) = fsutil::read_optional(&path)? else {
            tracing::debug!("no saved face templates");
            return Ok(Vec::new());
        };

        let plaintext = self.cipher.open(&sealed, &path)?;
        let identities: Vec<Identity> =
            serde_json::from_slice(&plaintext).map_err(|_| StorageError::corrupt(&path))?;
        tracing::info!(count = identities.len(), "loaded face templates");
        Ok(identities)
    }

    // --- PIN ---

    /// Hash and persist a 4-digit PIN under a fresh salt.
    pub fn save_pin(&self, pin: &str) -> Result<(), StorageError> {
        let record = PinRecord::derive(pin)?;
        let bytes = serde_json::to_vec(&record)?;
        fsutil::write_atomic(&self.path(PIN_FILE), &bytes)?;
        tracing::info!("PIN saved");
        Ok(())
    }

    /// Check a candidate PIN.
    ///
    /// With no PIN record, only the default PIN (if enabled) is accepted. A
    /// malformed record is reported as `CorruptOrTampered`.
    pub fn verify_pin(&self, candidate: &str) -> Result<bool, StorageError> {
        let path = self.path(PIN_FILE);
        let Some(bytes) = fsutil::read_optional(&path)? else {
            return Ok(match self.default_pin {
                Some(default) => {
                    let accepted = candidate == default;
                    if accepted {
                        tracing::warn!("no PIN configured; accepted the default PIN");
                    }
                    accepted
                }
                None => false,
            });
        };

        let record: PinRecord =
            serde_json::from_slice(&bytes).map_err(|_| StorageError::corrupt(&path))?;
        record.verify(candidate).ok_or_else(|| StorageError::corrupt(&path))
    }

    /// Delete the PIN record. Returns whether one existed.
    pub fn remove_pin(&self) -> Result<bool, StorageError> {
        let removed = fsutil::remove_if_exists(&self.path(PIN_FILE))?;
        if removed {
            tracing::info!("PIN removed");
        }
        Ok(removed)
    }

    pub fn has_pin(&self) -> bool {
        self.path(PIN_FILE).exists()
    }

    // --- Config ---

    pub fn save_config(&self, config: &AuthConfig) -> Result<(), StorageError> {
        config.validate()?;
        let bytes = serde_json::to_vec_pretty(config)?;
        fsutil::write_atomic(&self.path(CONFIG_FILE), &bytes)?;
        tracing::info!("configuration saved");
        Ok(())
    }

    /// Persisted settings merged over the defaults.
    ///
    /// A missing, unreadable or invalid file yields the defaults.
    pub fn load_config(&self) -> AuthConfig {
        let path = self.path(CONFIG_FILE);
        let bytes = match fsutil::read_optional(&path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return AuthConfig::default(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read config; using defaults");
                return AuthConfig::default();
            }
        };

        match serde_json::from_slice::<AuthConfig>(&bytes) {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(err) => {
                    tracing::warn!(error = %err, "invalid config; using defaults");
                    AuthConfig::default()
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "unparseable config; using defaults");
                AuthConfig::default()
            }
        }
    }

    // --- Failed attempts ---

    pub fn load_attempts(&self) -> Result<AttemptRecord, StorageError> {
        let path = self.path(ATTEMPTS_FILE);
        match fsutil::read_optional(&path)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|_| StorageError::corrupt(&path)),
            None => Ok(AttemptRecord::default()),
        }
    }

    /// Persist the failure count, stamping the lock time once `max_attempts` is hit.
    pub fn record_failures(&self, failed_attempts: u32, max_attempts: u32) -> Result<(), StorageError> {
        let locked_at = (failed_attempts >= max_attempts).then(Utc::now);
        let record = AttemptRecord {
            failed_attempts,
            locked_at,
        };
        let bytes = serde_json::to_vec(&record)?;
        fsutil::write_atomic(&self.path(ATTEMPTS_FILE), &bytes)
    }

    pub fn clear_attempts(&self) -> Result<(), StorageError> {
        fsutil::remove_if_exists(&self.path(ATTEMPTS_FILE)).map(|_| ())
    }

    // --- Lifecycle ---

    /// Remove templates, PIN, config and attempt counter. The key is kept.
    pub fn delete_all(&self) -> Result<(), StorageError> {
        for file in [TEMPLATES_FILE, PIN_FILE, CONFIG_FILE, ATTEMPTS_FILE] {
            fsutil::remove_if_exists(&self.path(file))?;
        }
        tracing::info!("deleted all face authentication data");
        Ok(())
    }

    /// True until a template file has been written.
    pub fn is_first_time_setup(&self) -> bool {
        !self.path(TEMPLATES_FILE).exists()
    }

    pub fn status(&self) -> Result<StoreStatus, StorageError> {
        Ok(StoreStatus {
            data_dir: self.dir.clone(),
            identities: self.load_templates()?.len(),
            pin_set: self.has_pin(),
            first_time_setup: self.is_first_time_setup(),
        })
    }
}

/// Default private data directory: `$XDG_DATA_HOME/gaze/secure`, else
/// `$HOME/.local/share/gaze/secure`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("gaze")
        .join("secure")
}
