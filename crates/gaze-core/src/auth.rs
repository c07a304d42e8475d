//! Multi-frame authentication state machine.
//!
//! A session aggregates per-frame match signals into one decision. It never
//! performs I/O and never sleeps: every transition takes the current instant
//! from the caller and returns the events it produced, so the async scanning
//! loop and the tests drive it the same way.
//!
//! ```text
//! Scanning --N consecutive matches--> Succeeded
//! Scanning --timeout--> Denied --retry--> Scanning
//!                       Denied --max_attempts reached--> Locked
//! Scanning --cancel / source closed--> Idle --retry--> Scanning
//! any phase --correct PIN (fallback enabled)--> Succeeded
//! ```

use crate::types::MatchResult;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;
pub const DEFAULT_CONSECUTIVE_MATCHES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("too many failed attempts; authentication is locked")]
    LockoutReached,
    #[error("PIN fallback is disabled")]
    PinFallbackDisabled,
    #[error("session cannot retry from phase {0:?}")]
    NotDenied(Phase),
}

/// Runtime knobs for one authentication session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPolicy {
    pub similarity_threshold: f32,
    pub consecutive_matches_required: u32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub fallback_to_pin: bool,
    /// Name reported when the PIN path unlocks.
    pub owner_name: String,
    /// How long a persisted lockout lasts before attempts reset.
    pub lockout: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            consecutive_matches_required: DEFAULT_CONSECUTIVE_MATCHES,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fallback_to_pin: true,
            owner_name: "Owner".to_string(),
            lockout: DEFAULT_LOCKOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not scanning: the frame source was stopped before a decision.
    Idle,
    Scanning,
    Succeeded,
    Denied,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Timeout,
}

/// What one processed frame says about the person in front of the camera.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSignal {
    /// No face detected or no embedding could be extracted.
    NoFace,
    NoMatch { score: f32 },
    Match { name: String, score: f32 },
}

impl From<MatchResult> for FrameSignal {
    fn from(result: MatchResult) -> Self {
        match (result.matched, result.name) {
            (true, Some(name)) => FrameSignal::Match {
                name,
                score: result.score,
            },
            _ => FrameSignal::NoMatch {
                score: result.score,
            },
        }
    }
}

/// Caller-facing notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// A matching frame extended the streak without completing it.
    MatchProgress { consecutive: u32, required: u32 },
    AuthSucceeded { name: String },
    AuthDenied {
        reason: DenyReason,
        attempts_remaining: u32,
    },
    AuthLocked,
    PinRejected,
    EnrollmentComplete { name: String },
    EnrollmentFailed { reason: String },
}

/// Transient state of one authentication attempt sequence.
#[derive(Debug, Clone)]
pub struct AuthSession {
    policy: AuthPolicy,
    phase: Phase,
    consecutive_matches: u32,
    failed_attempts: u32,
    scan_started: Instant,
    authenticated_as: Option<String>,
}

impl AuthSession {
    /// Start a fresh session in `Scanning`.
    pub fn start(policy: AuthPolicy, now: Instant) -> Self {
        Self::resume(policy, 0, now)
    }

    /// Start a session that carries over failed attempts from earlier runs.
    ///
    /// A carried-over count at or above `max_attempts` starts `Locked`.
    pub fn resume(policy: AuthPolicy, failed_attempts: u32, now: Instant) -> Self {
        let phase = if failed_attempts >= policy.max_attempts {
            Phase::Locked
        } else {
            Phase::Scanning
        };
        Self {
            policy,
            phase,
            consecutive_matches: 0,
            failed_attempts,
            scan_started: now,
            authenticated_as: None,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn consecutive_matches(&self) -> u32 {
        self.consecutive_matches
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.failed_attempts)
    }

    /// Name of the authenticated identity once `Succeeded`.
    pub fn authenticated_as(&self) -> Option<&str> {
        self.authenticated_as.as_deref()
    }

    /// True once the session will not scan again without caller action.
    pub fn is_settled(&self) -> bool {
        self.phase != Phase::Scanning
    }

    /// Feed one frame's signal. Ignored outside `Scanning`.
    pub fn on_frame(&mut self, signal: FrameSignal, now: Instant) -> Vec<AuthEvent> {
        if self.phase != Phase::Scanning {
            return Vec::new();
        }

        let events = self.check_timeout(now);
        if !events.is_empty() {
            return events;
        }

        match signal {
            FrameSignal::Match { name, score } => {
                self.consecutive_matches += 1;
                tracing::debug!(
                    name = %name,
                    score,
                    consecutive = self.consecutive_matches,
                    "frame matched"
                );
                if self.consecutive_matches >= self.policy.consecutive_matches_required {
                    self.succeed(name)
                } else {
                    vec![AuthEvent::MatchProgress {
                        consecutive: self.consecutive_matches,
                        required: self.policy.consecutive_matches_required,
                    }]
                }
            }
            FrameSignal::NoMatch { .. } | FrameSignal::NoFace => {
                // A broken streak is lost, not averaged.
                if self.consecutive_matches > 0 {
                    tracing::debug!(lost = self.consecutive_matches, "match streak broken");
                    self.consecutive_matches = 0;
                }
                Vec::new()
            }
        }
    }

    /// Deny the scan if it has run longer than the policy timeout.
    pub fn check_timeout(&mut self, now: Instant) -> Vec<AuthEvent> {
        if self.phase == Phase::Scanning
            && now.saturating_duration_since(self.scan_started) > self.policy.timeout
        {
            self.deny(DenyReason::Timeout)
        } else {
            Vec::new()
        }
    }

    /// Stop scanning without a decision. Nothing counts as a failure.
    pub fn cancel(&mut self) {
        if self.phase == Phase::Scanning {
            tracing::debug!("scan cancelled");
            self.phase = Phase::Idle;
            self.consecutive_matches = 0;
        }
    }

    /// Go back to `Scanning` after a denial or cancellation.
    pub fn retry(&mut self, now: Instant) -> Result<(), AuthError> {
        match self.phase {
            Phase::Denied | Phase::Idle => {
                self.phase = Phase::Scanning;
                self.consecutive_matches = 0;
                self.scan_started = now;
                tracing::debug!(attempts_remaining = self.attempts_remaining(), "retrying scan");
                Ok(())
            }
            Phase::Locked => Err(AuthError::LockoutReached),
            phase => Err(AuthError::NotDenied(phase)),
        }
    }

    /// Apply the outcome of a PIN check.
    ///
    /// Works from any phase, including `Locked`, and never counts toward
    /// `failed_attempts`.
    pub fn on_pin_result(&mut self, accepted: bool) -> Result<Vec<AuthEvent>, AuthError> {
        if !self.policy.fallback_to_pin {
            return Err(AuthError::PinFallbackDisabled);
        }
        if self.phase == Phase::Succeeded {
            return Ok(Vec::new());
        }
        if accepted {
            let owner = self.policy.owner_name.clone();
            Ok(self.succeed(owner))
        } else {
            tracing::info!("PIN rejected");
            Ok(vec![AuthEvent::PinRejected])
        }
    }

    fn succeed(&mut self, name: String) -> Vec<AuthEvent> {
        tracing::info!(name = %name, "authentication succeeded");
        self.phase = Phase::Succeeded;
        self.consecutive_matches = 0;
        self.authenticated_as = Some(name.clone());
        vec![AuthEvent::AuthSucceeded { name }]
    }

    fn deny(&mut self, reason: DenyReason) -> Vec<AuthEvent> {
        self.failed_attempts += 1;
        self.consecutive_matches = 0;

        if self.failed_attempts >= self.policy.max_attempts {
            tracing::warn!(failed_attempts = self.failed_attempts, "lockout reached");
            self.phase = Phase::Locked;
            vec![AuthEvent::AuthLocked]
        } else {
            let attempts_remaining = self.attempts_remaining();
            tracing::info!(?reason, attempts_remaining, "authentication denied");
            self.phase = Phase::Denied;
            vec![AuthEvent::AuthDenied {
                reason,
                attempts_remaining,
            }]
        }
    }
}
