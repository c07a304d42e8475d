//! The scanning loop: pulls frames at a fixed cadence, runs them through the
//! engine and feeds the signals into an [`AuthSession`] until it settles.

use crate::engine::{EngineError, EngineHandle};
use gaze_core::{AuthEvent, AuthSession, FrameSource, Identity, Phase};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Succeeded { name: String },
    Denied { attempts_remaining: u32 },
    Locked,
    /// The caller asked to stop. The session is back to `Idle`.
    Cancelled,
    /// The frame source ran dry before a decision. The session is back to `Idle`.
    SourceClosed,
}

/// Drive `session` until it settles, the source closes, or `cancel` turns true.
///
/// Every event the session produces is forwarded to `events`; a dropped
/// receiver is not an error. Frames are pulled at most once per
/// `poll_interval`, and the timeout is checked before each pull so a source
/// that only yields empty frames still ends in a denial.
pub async fn run_scan<S>(
    session: &mut AuthSession,
    engine: &EngineHandle,
    source: &mut S,
    gallery: Arc<[Identity]>,
    poll_interval: Duration,
    cancel: &mut watch::Receiver<bool>,
    events: &mpsc::UnboundedSender<AuthEvent>,
) -> Result<ScanOutcome, EngineError>
where
    S: FrameSource + ?Sized,
{
    if session.phase() == Phase::Locked {
        emit(events, vec![AuthEvent::AuthLocked]);
        return Ok(ScanOutcome::Locked);
    }
    if let Some(outcome) = settled(session) {
        return Ok(outcome);
    }

    let threshold = session.policy().similarity_threshold;
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        identities = gallery.len(),
        attempts_remaining = session.attempts_remaining(),
        "scan started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancelled(cancel) => return Ok(stop(session, ScanOutcome::Cancelled)),
            _ = ticker.tick() => {}
        }

        emit(events, session.check_timeout(now()));
        if let Some(outcome) = settled(session) {
            return Ok(outcome);
        }

        let Some(frame) = source.next_frame() else {
            tracing::info!("frame source closed");
            return Ok(stop(session, ScanOutcome::SourceClosed));
        };

        let signal = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Ok(stop(session, ScanOutcome::Cancelled)),
            signal = engine.analyze(frame, gallery.clone(), threshold) => match signal {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::error!(error = %err, "frame analysis failed; stopping scan");
                    session.cancel();
                    return Err(err);
                }
            },
        };

        emit(events, session.on_frame(signal, now()));
        if let Some(outcome) = settled(session) {
            return Ok(outcome);
        }
    }
}

/// Resolves once the flag is `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub(crate) fn now() -> Instant {
    time::Instant::now().into_std()
}

fn stop(session: &mut AuthSession, outcome: ScanOutcome) -> ScanOutcome {
    tracing::info!(?outcome, "scan stopped without a decision");
    session.cancel();
    outcome
}

pub(crate) fn emit(events: &mpsc::UnboundedSender<AuthEvent>, batch: Vec<AuthEvent>) {
    for event in batch {
        let _ = events.send(event);
    }
}

fn settled(session: &AuthSession) -> Option<ScanOutcome> {
    match session.phase() {
        Phase::Idle | Phase::Scanning => None,
        Phase::Succeeded => Some(ScanOutcome::Succeeded {
            name: session.authenticated_as().unwrap_or_default().to_string(),
        }),
        Phase::Denied => Some(ScanOutcome::Denied {
            attempts_remaining: session.attempts_remaining(),
        }),
        Phase::Locked => Some(ScanOutcome::Locked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::engine::{spawn_engine, Models};
    use chrono::Utc;
    use gaze_core::{AuthPolicy, BoundingBox, DenyReason, Embedding, FaceDetector, Frame};
    use std::sync::atomic::Ordering;

    const POLL: Duration = Duration::from_millis(50);

    fn gallery() -> Arc<[Identity]> {
        vec![
            Identity {
                name: "alice".into(),
                template: Embedding::new(vec![1.0, 0.0, 0.0]),
                sample_count: 3,
                enrolled_at: Utc::now(),
            },
            Identity {
                name: "bob".into(),
                template: Embedding::new(vec![0.0, 1.0, 0.0]),
                sample_count: 3,
                enrolled_at: Utc::now(),
            },
        ]
        .into()
    }

    fn policy(timeout: Duration) -> AuthPolicy {
        AuthPolicy {
            timeout,
            ..AuthPolicy::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AuthEvent>) -> Vec<AuthEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_matching_frames_succeed() {
        let engine = spawn_engine(models()).unwrap();
        let mut session = AuthSession::start(policy(Duration::from_secs(30)), now());
        let mut source = ScriptedSource::new(&[1, 1, 1], None);
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Succeeded { name: "alice".into() });
        assert_eq!(
            drain(&mut rx),
            vec![
                AuthEvent::MatchProgress { consecutive: 1, required: 3 },
                AuthEvent::MatchProgress { consecutive: 2, required: 3 },
                AuthEvent::AuthSucceeded { name: "alice".into() },
            ]
        );
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_streak_restarts_count() {
        let engine = spawn_engine(models()).unwrap();
        let mut session = AuthSession::start(policy(Duration::from_secs(30)), now());
        // match, match, no face, then three more matches
        let mut source = ScriptedSource::new(&[1, 1, 0, 1, 1, 1], None);
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Succeeded { name: "alice".into() });
        let progress = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, AuthEvent::MatchProgress { .. }))
            .count();
        assert_eq!(progress, 4);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_face_times_out() {
        let engine = spawn_engine(models()).unwrap();
        let mut session = AuthSession::start(policy(Duration::from_secs(1)), now());
        // Code 3 extracts an embedding orthogonal to everyone in the gallery
        let mut source = ScriptedSource::new(&[], Some(3));
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Denied { attempts_remaining: 4 });
        assert_eq!(
            drain(&mut rx),
            vec![AuthEvent::AuthDenied {
                reason: DenyReason::Timeout,
                attempts_remaining: 4,
            }]
        );
        assert_eq!(session.failed_attempts(), 1);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_attempt_locks() {
        let engine = spawn_engine(models()).unwrap();
        let mut session = AuthSession::resume(policy(Duration::from_secs(1)), 4, now());
        let mut source = ScriptedSource::new(&[], Some(0));
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Locked);
        assert_eq!(drain(&mut rx), vec![AuthEvent::AuthLocked]);

        // A locked session does not scan again
        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, ScanOutcome::Locked);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_scan_without_penalty() {
        let engine = spawn_engine(models()).unwrap();
        let mut session = AuthSession::start(policy(Duration::from_secs(30)), now());
        let mut source = ScriptedSource::new(&[], Some(0));
        let (cancel_tx, mut cancel) = watch::channel(false);
        let (tx, _rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(500)).await;
            let _ = cancel_tx.send(true);
        });

        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Cancelled);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.failed_attempts(), 0);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_closed_leaves_session_idle() {
        let engine = spawn_engine(models()).unwrap();
        let mut session = AuthSession::start(policy(Duration::from_secs(30)), now());
        let mut source = ScriptedSource::new(&[1, 0], None);
        let released = source.released.clone();
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ScanOutcome::SourceClosed);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.failed_attempts(), 0);

        drop(source);
        assert!(released.load(Ordering::SeqCst));
        engine.shutdown().await;
    }

    struct CrashingDetector;

    impl FaceDetector for CrashingDetector {
        fn detect(&mut self, _frame: &Frame) -> Option<BoundingBox> {
            panic!("detector crashed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_failure_leaves_session_idle() {
        let engine = spawn_engine(Models {
            detector: Box::new(CrashingDetector),
            extractor: Box::new(FakeExtractor),
        })
        .unwrap();
        let mut session = AuthSession::start(policy(Duration::from_secs(30)), now());
        let mut source = ScriptedSource::new(&[1, 1, 1], None);
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = run_scan(
            &mut session,
            engine.handle(),
            &mut source,
            gallery(),
            POLL,
            &mut cancel,
            &tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::ChannelClosed));
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.failed_attempts(), 0);
        engine.shutdown().await;
    }
}
