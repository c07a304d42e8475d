use gaze_core::{
    AuthError, CosineMatcher, Embedding, EmbeddingExtractor, EnrollmentError, FaceDetector,
    Frame, FrameSignal, Identity, Matcher,
};
use gaze_store::StorageError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to load face models: {0}")]
    ModelLoad(String),
    #[error("failed to spawn engine thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("face authentication is disabled in the configuration")]
    Disabled,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// The detector/extractor pair an engine thread owns for its lifetime.
pub struct Models {
    pub detector: Box<dyn FaceDetector>,
    pub extractor: Box<dyn EmbeddingExtractor>,
}

/// Loads fresh model instances for each session or enrollment.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Models, EngineError>;
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<Models, EngineError> + Send + Sync,
{
    fn load(&self) -> Result<Models, EngineError> {
        self()
    }
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Analyze {
        frame: Frame,
        gallery: Arc<[Identity]>,
        threshold: f32,
        reply: oneshot::Sender<FrameSignal>,
    },
    ExtractSamples {
        frames: Vec<Frame>,
        reply: oneshot::Sender<Vec<Option<Embedding>>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect, extract and match one frame against the gallery.
    pub async fn analyze(
        &self,
        frame: Frame,
        gallery: Arc<[Identity]>,
        threshold: f32,
    ) -> Result<FrameSignal, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                frame,
                gallery,
                threshold,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Detect and extract every frame; `None` where no usable face was found.
    pub async fn extract_samples(
        &self,
        frames: Vec<Frame>,
    ) -> Result<Vec<Option<Embedding>>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ExtractSamples {
                frames,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// A running engine thread plus its handle.
pub struct Engine {
    handle: EngineHandle,
    thread: std::thread::JoinHandle<()>,
}

impl Engine {
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Close the request channel and wait for the thread to drop its models.
    ///
    /// Returns once the thread has exited; clones of the handle held
    /// elsewhere keep it alive until they are dropped too.
    pub async fn shutdown(self) {
        let Engine { handle, thread } = self;
        drop(handle);
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => tracing::debug!("engine thread joined"),
            Ok(Err(_)) => tracing::error!("engine thread panicked"),
            Err(err) => tracing::error!(error = %err, "failed to join engine thread"),
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Detection and extraction can take tens of milliseconds per frame, so they
/// run off the async runtime. The thread owns the models and drops them when
/// every handle is gone.
pub fn spawn_engine(models: Models) -> Result<Engine, EngineError> {
    let Models {
        mut detector,
        mut extractor,
    } = models;
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    let thread = std::thread::Builder::new()
        .name("gaze-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze {
                        frame,
                        gallery,
                        threshold,
                        reply,
                    } => {
                        let signal = analyze_frame(
                            detector.as_mut(),
                            extractor.as_mut(),
                            &frame,
                            &gallery,
                            threshold,
                        );
                        let _ = reply.send(signal);
                    }
                    EngineRequest::ExtractSamples { frames, reply } => {
                        let samples = frames
                            .iter()
                            .map(|frame| extract_face(detector.as_mut(), extractor.as_mut(), frame))
                            .collect();
                        let _ = reply.send(samples);
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })
        .map_err(EngineError::WorkerSpawn)?;

    Ok(Engine {
        handle: EngineHandle { tx },
        thread,
    })
}

/// Detect the face and extract its embedding. `None` means "no signal".
fn extract_face(
    detector: &mut dyn FaceDetector,
    extractor: &mut dyn EmbeddingExtractor,
    frame: &Frame,
) -> Option<Embedding> {
    if frame.is_empty() {
        return None;
    }
    let face = detector.detect(frame)?;
    if !face.fits_within(frame.width, frame.height) {
        tracing::debug!(sequence = frame.sequence, "face box outside frame");
        return None;
    }
    extractor
        .extract(frame, &face)
        .filter(|embedding| embedding.is_valid())
}

fn analyze_frame(
    detector: &mut dyn FaceDetector,
    extractor: &mut dyn EmbeddingExtractor,
    frame: &Frame,
    gallery: &[Identity],
    threshold: f32,
) -> FrameSignal {
    match extract_face(detector, extractor, frame) {
        Some(embedding) => CosineMatcher.identify(&embedding, gallery, threshold).into(),
        None => FrameSignal::NoFace,
    }
}
