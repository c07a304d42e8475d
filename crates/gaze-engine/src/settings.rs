use std::path::PathBuf;
use std::time::Duration;

/// Process settings, loaded from environment variables.
///
/// These describe where the process runs, not how authentication behaves;
/// the latter lives in the persisted `AuthConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Private directory holding the credential store.
    pub data_dir: PathBuf,
    /// How often a scanning session pulls a frame (default: 50 ms).
    pub poll_interval: Duration,
}

impl Settings {
    /// Load settings from `GAZE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("GAZE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| gaze_store::default_data_dir());

        Self {
            data_dir,
            poll_interval: Duration::from_millis(env_u64("GAZE_POLL_INTERVAL_MS", 50).max(1)),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
