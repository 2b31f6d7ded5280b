//! System settings
//!
//! Loaded through the `config` crate: built-in defaults, then an optional
//! `classroom.toml`, then `CLASSROOM_*` environment overrides (e.g.
//! `CLASSROOM_CAMERA__SYNTHETIC=true`).

use crate::gate::GateConfig;
use crate::worker::WorkerConfig;
use camera_capture::CameraConfig;
use door_link::DoorLinkConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vision::AttentionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub device_index: u32,
    pub max_probe_index: u32,
    pub stream_width: u32,
    pub stream_height: u32,
    pub target_fps: u32,
    pub synthetic: bool,
}

impl Default for CameraSettings {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Minimum 0-100 score for a database match
    pub threshold: f32,
    /// Sampled frames between detection rounds
    pub detection_interval: u64,
    /// Wall-clock budget for one recognition call (ms)
    pub timeout_ms: u64,
    /// Watchdog ceiling for a stuck in-flight marker (ms)
    pub watchdog_ms: u64,
    /// Worker queue poll timeout (ms)
    pub poll_ms: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            detection_interval: 30,
            timeout_ms: 3_000,
            watchdog_ms: 8_000,
            poll_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionSettings {
    /// Per-identity re-analysis interval (seconds)
    pub interval_secs: u64,
    /// Worker queue poll timeout (ms)
    pub poll_ms: u64,
}

impl Default for EmotionSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            poll_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionSettings {
    pub jitter_threshold: f32,
    pub window_size: usize,
    pub min_samples: usize,
    pub emit_interval_secs: u64,
}

impl Default for AttentionSettings {
    fn default() -> Self {
        Self {
            jitter_threshold: 12.0,
            window_size: 30,
            min_samples: 10,
            emit_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Actuate the door automatically on an identity's first sighting
    pub auto_open_door: bool,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            auto_open_door: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorSettings {
    pub port: String,
    /// Ports probed when the configured one fails to connect
    pub fallback_ports: Vec<String>,
    pub baud: u32,
    /// Board boot delay after opening the port (ms)
    pub settle_ms: u64,
    /// Actuate once at startup to verify the servo and LEDs respond
    pub startup_test: bool,
    /// Use the mock transport instead of real hardware
    pub mock: bool,
}

impl Default for DoorSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            fallback_ports: vec![
                "/dev/ttyUSB1".to_string(),
                "/dev/ttyACM0".to_string(),
                "/dev/ttyACM1".to_string(),
            ],
            baud: 9600,
            settle_ms: 2_000,
            startup_test: true,
            mock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub dataset_path: String,
    pub logs_dir: String,
    pub timetable_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dataset_path: "dataset".to_string(),
            logs_dir: "logs".to_string(),
            timetable_path: "data/timetable.csv".to_string(),
        }
    }
}

/// Complete system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub recognition: RecognitionSettings,
    pub emotion: EmotionSettings,
    pub attention: AttentionSettings,
    pub gate: GateSettings,
    pub door: DoorSettings,
    pub api: ApiSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// Load defaults, `classroom.toml` if present, then env overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("classroom").required(false))
            .add_source(config::Environment::with_prefix("CLASSROOM").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device_index: self.camera.device_index,
            max_probe_index: self.camera.max_probe_index,
            stream_width: self.camera.stream_width,
            stream_height: self.camera.stream_height,
            target_fps: self.camera.target_fps,
            synthetic: self.camera.synthetic,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.recognition.poll_ms),
            recognition_timeout: Duration::from_millis(self.recognition.timeout_ms),
            watchdog_ceiling: Duration::from_millis(self.recognition.watchdog_ms),
            emotion_poll_interval: Duration::from_millis(self.emotion.poll_ms),
        }
    }

    pub fn attention_config(&self) -> AttentionConfig {
        AttentionConfig {
            jitter_threshold: self.attention.jitter_threshold,
            window_size: self.attention.window_size,
            min_samples: self.attention.min_samples,
            emit_interval: Duration::from_secs(self.attention.emit_interval_secs),
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            auto_open_door: self.gate.auto_open_door,
        }
    }

    pub fn door_config(&self) -> DoorLinkConfig {
        DoorLinkConfig {
            port: self.door.port.clone(),
            baud: self.door.baud,
            settle: Duration::from_millis(self.door.settle_ms),
        }
    }

    pub fn emotion_interval(&self) -> Duration {
        Duration::from_secs(self.emotion.interval_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
