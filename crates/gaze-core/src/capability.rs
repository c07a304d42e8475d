//! Seams to the external face models and the camera.
//!
//! Detection and embedding extraction are black boxes to Gaze: a detector
//! returns zero or one face per frame, an extractor turns a detected face into
//! a fixed-length vector. Implementations may be heavy (ONNX sessions) and
//! take `&mut self`; the engine keeps them on a dedicated worker thread.

use crate::frame::Frame;
use crate::types::{BoundingBox, Embedding};

/// Finds the most prominent face in a frame.
///
/// Calling it twice on the same frame must yield the same box.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Option<BoundingBox>;
}

/// Produces an embedding for a face region of a frame.
///
/// Returns `None` on a degenerate crop (zero-area or out-of-bounds box).
pub trait EmbeddingExtractor: Send {
    fn extract(&mut self, frame: &Frame, face: &BoundingBox) -> Option<Embedding>;
}

/// A cooperative frame producer owned by one authentication session.
///
/// The source is acquired when a session starts and dropped when it ends,
/// which is where implementations release the camera.
pub trait FrameSource: Send {
    /// Next available frame, or `None` once the source has closed.
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Option<BoundingBox> {
        (**self).detect(frame)
    }
}

impl<T: EmbeddingExtractor + ?Sized> EmbeddingExtractor for Box<T> {
    fn extract(&mut self, frame: &Frame, face: &BoundingBox) -> Option<Embedding> {
        (**self).extract(frame, face)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }
}
