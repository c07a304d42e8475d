//! Persisted failed-attempt counter, so a restart does not lift a lockout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub failed_attempts: u32,
    /// Set when the counter reached `max_attempts`.
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// Failures that still count at `now`; an expired lockout counts as none.
    pub fn effective_failures(&self, lockout: Duration, now: DateTime<Utc>) -> u32 {
        match self.locked_at {
            Some(locked_at) => {
                let elapsed = now.signed_duration_since(locked_at);
                let expired = elapsed
                    .to_std()
                    .map(|elapsed| elapsed >= lockout)
                    .unwrap_or(false);
                if expired {
                    0
                } else {
                    self.failed_attempts
                }
            }
            None => self.failed_attempts,
        }
    }
}
