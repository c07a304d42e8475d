//! Persisted authentication settings.
//!
//! Every field defaults individually, so a file written by an older version
//! (missing keys) still loads, and unknown keys are ignored.

use crate::error::StorageError;
use gaze_core::AuthPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub similarity_threshold: f32,
    pub consecutive_matches_required: u32,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub fallback_to_pin: bool,
    pub owner_name: String,
    pub lockout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.6,
            consecutive_matches_required: 3,
            timeout_seconds: 30,
            max_attempts: 5,
            fallback_to_pin: true,
            owner_name: "Owner".to_string(),
            lockout_seconds: 300,
        }
    }
}

impl AuthConfig {
    /// Runtime policy for an authentication session.
    pub fn policy(&self) -> AuthPolicy {
        AuthPolicy {
            similarity_threshold: self.similarity_threshold,
            consecutive_matches_required: self.consecutive_matches_required,
            timeout: Duration::from_secs(self.timeout_seconds),
            max_attempts: self.max_attempts,
            fallback_to_pin: self.fallback_to_pin,
            owner_name: self.owner_name.clone(),
            lockout: Duration::from_secs(self.lockout_seconds),
        }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        let invalid = |key: &str, message: &str| StorageError::InvalidConfigValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if !self.similarity_threshold.is_finite()
            || !(-1.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(invalid("similarity_threshold", "must be within [-1, 1]"));
        }
        if self.consecutive_matches_required == 0 {
            return Err(invalid("consecutive_matches_required", "must be at least 1"));
        }
        if self.timeout_seconds == 0 {
            return Err(invalid("timeout_seconds", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    /// Copy of this config with one key set from its textual form.
    ///
    /// `raw` is parsed as JSON (`true`, `0.7`, `4`); string-valued keys take
    /// it verbatim.
    pub fn with_override(&self, key: &str, raw: &str) -> Result<AuthConfig, StorageError> {
        let mut value = serde_json::to_value(self)?;
        let Value::Object(map) = &mut value else {
            return Err(StorageError::UnknownConfigKey(key.to_string()));
        };

        let parsed = match map.get(key) {
            None => return Err(StorageError::UnknownConfigKey(key.to_string())),
            Some(Value::String(_)) => Value::String(raw.to_string()),
            Some(_) => serde_json::from_str(raw).map_err(|e| StorageError::InvalidConfigValue {
                key: key.to_string(),
                message: e.to_string(),
            })?,
        };
        map.insert(key.to_string(), parsed);

        let updated: AuthConfig =
            serde_json::from_value(value).map_err(|e| StorageError::InvalidConfigValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_take_defaults() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"similarity_threshold": 0.7, "owner_name": "Ada"}"#).unwrap();
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.owner_name, "Ada");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.lockout_seconds, 300);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config: AuthConfig = serde_json::from_str(r#"{"future_flag": true}"#).unwrap();
        assert_eq!(config, AuthConfig::default());
    }

    #[test]
    fn test_policy_mapping() {
        let policy = AuthConfig::default().policy();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.consecutive_matches_required, 3);
        assert_eq!(policy, AuthPolicy::default());
    }

    #[test]
    fn test_with_override() {
        let base = AuthConfig::default();

        let updated = base.with_override("max_attempts", "3").unwrap();
        assert_eq!(updated.max_attempts, 3);

        let updated = base.with_override("fallback_to_pin", "false").unwrap();
        assert!(!updated.fallback_to_pin);

        let updated = base.with_override("owner_name", "1234").unwrap();
        assert_eq!(updated.owner_name, "1234");
    }

    #[test]
    fn test_with_override_rejects_bad_input() {
        let base = AuthConfig::default();
        assert!(matches!(
            base.with_override("no_such_key", "1"),
            Err(StorageError::UnknownConfigKey(_))
        ));
        assert!(matches!(
            base.with_override("max_attempts", "many"),
            Err(StorageError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            base.with_override("max_attempts", "0"),
            Err(StorageError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            base.with_override("similarity_threshold", "1.5"),
            Err(StorageError::InvalidConfigValue { .. })
        ));
    }
}
