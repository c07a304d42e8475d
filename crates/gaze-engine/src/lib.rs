//! gaze-engine — Inference worker, scanning sessions and the `FaceAuth` facade.
//!
//! Face detection and embedding extraction run on a dedicated OS thread
//! ([`engine`]); the async scanning loop ([`session`]) pulls frames at a fixed
//! cadence and drives the state machine from `gaze-core`; [`service`] ties
//! both to the encrypted credential store.

pub mod engine;
pub mod service;
pub mod session;
pub mod settings;

pub use engine::{spawn_engine, Engine, EngineError, EngineHandle, ModelLoader, Models};
pub use service::FaceAuth;
pub use session::{run_scan, ScanOutcome};
pub use settings::Settings;
