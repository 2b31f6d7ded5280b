//! Classroom Vision
//!
//! The pipeline's perception layer:
//! - face detection over captured frames
//! - the recognition boundary (trait + filesystem-backed matcher)
//! - simplified emotion heuristics with per-identity rate limiting
//! - attention estimation from face-position jitter

pub mod attention;
pub mod detector;
pub mod emotion;
pub mod recognizer;

pub use attention::{AttentionConfig, AttentionTracker};
pub use detector::{DetectorConfig, FaceDetector};
pub use emotion::{EmotionAnalyzer, EmotionScore};
pub use recognizer::{FilesystemRecognizer, Recognition, Recognizer};

use thiserror::Error;

/// Vision error types
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Enrollment database unreadable: {0}")]
    Database(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("Recognition backend failed: {0}")]
    Backend(String),
}
