//! Camera Capture Library for the Classroom Pipeline
//!
//! Owns the capture device and runs the dedicated capture loop:
//! - latest-frame cell (copy-on-read) shared with all consumers
//! - depth-1 freshness buffer for the streaming path
//! - FPS accounting and bounded catch-up throttling
//! - throttled frame callbacks (1 frame in 3)

pub mod device;
pub mod frame;
pub mod manager;

pub use device::{open_device, CaptureDevice, SyntheticDevice};
pub use frame::{FaceBox, VideoFrame};
pub use manager::{CallbackId, CameraManager, CameraStats};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No capture device available (probed indices {0}..={1})")]
    DeviceUnavailable(u32, u32),

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Frame read failed: {0}")]
    Read(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Capture thread did not report readiness")]
    StartupTimeout,
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Preferred device index
    pub device_index: u32,
    /// Highest fallback index probed when the preferred one fails
    pub max_probe_index: u32,
    /// Streaming width (frames are resized to this if the device differs)
    pub stream_width: u32,
    /// Streaming height
    pub stream_height: u32,
    /// Target capture FPS
    pub target_fps: u32,
    /// Use the synthetic device instead of real hardware
    pub synthetic: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            max_probe_index: 4,
            stream_width: 640,
            stream_height: 480,
            target_fps: 30,
            synthetic: false,
        }
    }
}

impl CameraConfig {
    /// Config backed by the synthetic device, for tests and headless runs.
    pub fn synthetic() -> Self {
        Self {
            synthetic: true,
            ..Default::default()
        }
    }
}
