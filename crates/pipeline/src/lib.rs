//! Classroom Pipeline
//!
//! Ties capture, detection, recognition, and actuation together:
//! - `AttendanceGate` decides what a recognition event triggers
//! - `RecognitionWorker`/`EmotionWorker` drain the depth-1 queues
//! - `ClassroomSystem` is the context object every caller goes through;
//!   there is no ambient global state anywhere in the pipeline

pub mod gate;
pub mod settings;
pub mod stats;
pub mod system;
pub mod worker;

pub use gate::{AttendanceGate, GateConfig, GateDecision};
pub use settings::Settings;
pub use stats::{PipelineStats, StatsSnapshot};
pub use system::{ClassroomSystem, ManualTestOutcome, SystemStatus};
pub use worker::{
    InFlight, PendingEmotion, PendingRecognition, RecognitionOutcome, WorkerConfig,
};

use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Camera failed: {0}")]
    Camera(#[from] camera_capture::CameraError),

    #[error("Storage failed: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration failed: {0}")]
    Config(#[from] config::ConfigError),
}
