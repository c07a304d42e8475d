//! `FaceAuth`: enrollment, scanning, PIN fallback and reset over one
//! credential store.

use crate::engine::{spawn_engine, EngineError, ModelLoader};
use crate::session::{self, run_scan, ScanOutcome};
use chrono::Utc;
use gaze_core::{AuthError, AuthEvent, AuthSession, Frame, FrameSource, Identity, TemplateStore};
use gaze_store::{AuthConfig, SecureCredentialStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// The authentication facade. One instance serves one session at a time;
/// every mutating operation takes `&mut self`.
pub struct FaceAuth<L> {
    store: SecureCredentialStore,
    templates: TemplateStore,
    config: AuthConfig,
    loader: L,
    poll_interval: Duration,
}

impl<L: ModelLoader> FaceAuth<L> {
    /// Load templates and settings from `store`.
    ///
    /// A template file that fails to decrypt is an error here, never an
    /// empty gallery.
    pub fn open(
        store: SecureCredentialStore,
        loader: L,
        poll_interval: Duration,
    ) -> Result<Self, EngineError> {
        let templates = TemplateStore::from_identities(store.load_templates()?);
        let config = store.load_config();
        tracing::info!(
            identities = templates.len(),
            enabled = config.enabled,
            "face authentication ready"
        );

        Ok(Self {
            store,
            templates,
            config,
            loader,
            poll_interval,
        })
    }

    pub fn store(&self) -> &SecureCredentialStore {
        &self.store
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Validate, persist and apply new settings. Sessions already begun keep
    /// the policy they started with.
    pub fn set_config(&mut self, config: AuthConfig) -> Result<(), EngineError> {
        self.store.save_config(&config)?;
        self.config = config;
        Ok(())
    }

    /// Enrolled identity names, in enrollment order.
    pub fn identities(&self) -> Vec<String> {
        self.templates.all()
    }

    pub fn is_first_time_setup(&self) -> bool {
        self.store.is_first_time_setup()
    }

    /// Enroll (or re-enroll) `name` from captured frames and persist the result.
    ///
    /// Emits `EnrollmentComplete` or `EnrollmentFailed`. On failure the
    /// in-memory and on-disk galleries are unchanged.
    pub async fn enroll(
        &mut self,
        name: &str,
        frames: Vec<Frame>,
        events: &mpsc::UnboundedSender<AuthEvent>,
    ) -> Result<Identity, EngineError> {
        let result = self.enroll_frames(name, frames).await;
        let event = match &result {
            Ok(identity) => {
                tracing::info!(
                    name = %identity.name,
                    samples = identity.sample_count,
                    "enrollment complete"
                );
                AuthEvent::EnrollmentComplete {
                    name: identity.name.clone(),
                }
            }
            Err(err) => {
                tracing::warn!(name, error = %err, "enrollment failed");
                AuthEvent::EnrollmentFailed {
                    reason: err.to_string(),
                }
            }
        };
        session::emit(events, vec![event]);
        result
    }

    async fn enroll_frames(&mut self, name: &str, frames: Vec<Frame>) -> Result<Identity, EngineError> {
        let engine = spawn_engine(self.loader.load()?)?;
        let samples = engine.handle().extract_samples(frames).await;
        engine.shutdown().await;

        let mut next = self.templates.clone();
        let identity = next.enroll_embeddings(name, samples?)?;
        self.store.save_templates(next.identities())?;
        self.templates = next;
        Ok(identity)
    }

    /// Delete one identity. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> Result<bool, EngineError> {
        let mut next = self.templates.clone();
        if !next.delete(name) {
            return Ok(false);
        }
        self.store.save_templates(next.identities())?;
        self.templates = next;
        tracing::info!(name, "identity deleted");
        Ok(true)
    }

    /// Start a session, carrying over failures that are still in force.
    ///
    /// An expired lockout is cleared from disk here. A stored count that
    /// already reaches `max_attempts` (the limit was lowered) starts its
    /// lockout now so that it can expire.
    pub fn begin_session(&self) -> Result<AuthSession, EngineError> {
        let policy = self.config.policy();
        let record = self.store.load_attempts()?;
        let failed = record.effective_failures(policy.lockout, Utc::now());
        if record.locked_at.is_some() && failed == 0 {
            tracing::info!("lockout expired; attempts reset");
            self.store.clear_attempts()?;
        } else if record.locked_at.is_none() && failed >= policy.max_attempts {
            tracing::warn!(
                failed_attempts = failed,
                max_attempts = policy.max_attempts,
                "stored failures exceed the attempt limit; locking"
            );
            self.store.record_failures(failed, policy.max_attempts)?;
        }
        Ok(AuthSession::resume(policy, failed, session::now()))
    }

    /// Run one scan with freshly loaded models, released when the scan ends.
    ///
    /// New failures are persisted before returning; a success clears them.
    pub async fn scan<S>(
        &self,
        session: &mut AuthSession,
        source: &mut S,
        cancel: &mut watch::Receiver<bool>,
        events: &mpsc::UnboundedSender<AuthEvent>,
    ) -> Result<ScanOutcome, EngineError>
    where
        S: FrameSource + ?Sized,
    {
        if !self.config.enabled {
            return Err(EngineError::Disabled);
        }

        let failed_before = session.failed_attempts();
        let gallery: Arc<[Identity]> = self.templates.identities().into();
        let engine = spawn_engine(self.loader.load()?)?;
        let result = run_scan(
            session,
            engine.handle(),
            source,
            gallery,
            self.poll_interval,
            cancel,
            events,
        )
        .await;
        engine.shutdown().await;
        let outcome = result?;

        match outcome {
            ScanOutcome::Succeeded { .. } => self.store.clear_attempts()?,
            ScanOutcome::Denied { .. } | ScanOutcome::Locked
                if session.failed_attempts() != failed_before =>
            {
                self.store
                    .record_failures(session.failed_attempts(), session.policy().max_attempts)?
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Return a denied or cancelled session to scanning.
    pub fn retry(&self, session: &mut AuthSession) -> Result<(), EngineError> {
        session.retry(session::now())?;
        Ok(())
    }

    /// Begin a session and scan once.
    pub async fn authenticate<S>(
        &self,
        source: &mut S,
        cancel: &mut watch::Receiver<bool>,
        events: &mpsc::UnboundedSender<AuthEvent>,
    ) -> Result<(AuthSession, ScanOutcome), EngineError>
    where
        S: FrameSource + ?Sized,
    {
        let mut session = self.begin_session()?;
        let outcome = self.scan(&mut session, source, cancel, events).await?;
        Ok((session, outcome))
    }

    /// Check a PIN against the stored record and apply it to `session`.
    ///
    /// Accepted from any phase, including `Locked`; a rejection never counts
    /// as a failed attempt. Success clears the persisted failure counter.
    pub fn verify_pin(
        &self,
        session: &mut AuthSession,
        candidate: &str,
        events: &mpsc::UnboundedSender<AuthEvent>,
    ) -> Result<bool, EngineError> {
        if !session.policy().fallback_to_pin {
            return Err(AuthError::PinFallbackDisabled.into());
        }
        let accepted = self.store.verify_pin(candidate)?;
        session::emit(events, session.on_pin_result(accepted)?);
        if accepted {
            self.store.clear_attempts()?;
        }
        Ok(accepted)
    }

    /// Remove every identity, the PIN, the settings and the failure counter.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.store.delete_all()?;
        self.templates.clear();
        self.config = AuthConfig::default();
        Ok(())
    }
}
