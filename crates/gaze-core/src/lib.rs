//! gaze-core — Face template matching and authentication policy.
//!
//! Holds the pure domain of Gaze: embeddings and identities, the cosine
//! matcher, enrollment templates and the multi-frame authentication state
//! machine. Face detection and embedding extraction are consumed through the
//! traits in [`capability`]; nothing in this crate touches a camera or disk.

pub mod auth;
pub mod capability;
pub mod frame;
pub mod templates;
pub mod types;

pub use auth::{AuthError, AuthEvent, AuthPolicy, AuthSession, DenyReason, FrameSignal, Phase};
pub use capability::{EmbeddingExtractor, FaceDetector, FrameSource};
pub use frame::Frame;
pub use templates::{EnrollmentError, TemplateStore, MIN_ENROLLMENT_SAMPLES};
pub use types::{BoundingBox, CosineMatcher, Embedding, Identity, MatchResult, Matcher};
