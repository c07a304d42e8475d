//! gaze-store — Secure credential storage.
//!
//! Keeps face templates encrypted at rest (AES-256-GCM, random per-install
//! key), the fallback PIN as a salted PBKDF2 hash, and the authentication
//! settings, all in an owner-only directory.

pub mod attempts;
pub mod cipher;
pub mod config;
pub mod error;
mod fsutil;
pub mod keyfile;
pub mod pin;
pub mod store;

pub use attempts::AttemptRecord;
pub use config::AuthConfig;
pub use error::StorageError;
pub use pin::validate_pin;
pub use store::{default_data_dir, SecureCredentialStore, StoreStatus, DEFAULT_PIN};
