//! Attention estimation from face-position jitter
//!
//! Tracks the recent center positions of each face. A calm face sits still;
//! a distracted one wanders. The tracker emits a sample only when the status
//! changes or the re-emit interval elapses, so the log stays readable.

use camera_capture::FaceBox;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use storage::{AttentionSample, AttentionStatus};
use tracing::debug;

/// Attention tuning
#[derive(Debug, Clone)]
pub struct AttentionConfig {
    /// Movement std-dev (pixels) above which a face counts as distracted
    pub jitter_threshold: f32,
    /// Positions retained per face
    pub window_size: usize,
    /// Minimum samples before a judgment is made
    pub min_samples: usize,
    /// Re-emit a sample after this long even without a status change
    pub emit_interval: Duration,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            jitter_threshold: 12.0,
            window_size: 30,
            min_samples: 10,
            emit_interval: Duration::from_secs(10),
        }
    }
}

struct FaceHistory {
    positions: VecDeque<(f32, f32)>,
    last_status: AttentionStatus,
    last_emit: Instant,
    emitted_once: bool,
}

pub struct AttentionTracker {
    config: AttentionConfig,
    history: Mutex<HashMap<String, FaceHistory>>,
}

impl AttentionTracker {
    pub fn new(config: AttentionConfig) -> Self {
        Self {
            config,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one detection round: face boxes paired with the names the
    /// pipeline currently attributes to them. Returns the samples worth
    /// logging this round.
    pub fn update(&self, faces: &[(FaceBox, String)]) -> Vec<AttentionSample> {
        let mut samples = Vec::new();
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());

        for (face, name) in faces {
            let entry = history.entry(name.clone()).or_insert_with(|| FaceHistory {
                positions: VecDeque::with_capacity(self.config.window_size),
                last_status: AttentionStatus::Collecting,
                last_emit: Instant::now(),
                emitted_once: false,
            });

            let (cx, cy) = face.center();
            if entry.positions.len() >= self.config.window_size {
                entry.positions.pop_front();
            }
            entry.positions.push_back((cx as f32, cy as f32));

            if entry.positions.len() < self.config.min_samples {
                continue;
            }

            let status = self.judge(&entry.positions);
            let emit_due = entry.last_emit.elapsed() > self.config.emit_interval;
            if status == entry.last_status && entry.emitted_once && !emit_due {
                continue;
            }

            let (std_x, std_y) = movement_stats(&entry.positions);
            debug!(
                "Attention {}: {} (std_x {:.1}, std_y {:.1})",
                name,
                status.as_str(),
                std_x,
                std_y
            );

            samples.push(AttentionSample {
                student_name: name.clone(),
                timestamp: Utc::now(),
                status,
                std_x,
                std_y,
            });
            entry.last_status = status;
            entry.last_emit = Instant::now();
            entry.emitted_once = true;
        }

        samples
    }

    /// Current status per tracked face.
    pub fn current_statuses(&self) -> HashMap<String, AttentionStatus> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, h)| (name.clone(), h.last_status))
            .collect()
    }

    /// Forget all histories (camera restart, roster change).
    pub fn reset(&self) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn judge(&self, positions: &VecDeque<(f32, f32)>) -> AttentionStatus {
        let recent: Vec<(f32, f32)> = positions
            .iter()
            .rev()
            .take(self.config.min_samples)
            .copied()
            .collect();
        if recent.len() < self.config.min_samples / 2 {
            return AttentionStatus::Insufficient;
        }

        let (std_x, std_y) = stats_of(&recent);
        if std_x.max(std_y) > self.config.jitter_threshold {
            AttentionStatus::Distracted
        } else {
            AttentionStatus::Focused
        }
    }
}

impl Default for AttentionTracker {
    fn default() -> Self {
        Self::new(AttentionConfig::default())
    }
}

fn movement_stats(positions: &VecDeque<(f32, f32)>) -> (f32, f32) {
    let all: Vec<(f32, f32)> = positions.iter().copied().collect();
    stats_of(&all)
}

fn stats_of(positions: &[(f32, f32)]) -> (f32, f32) {
    if positions.len() < 2 {
        return (0.0, 0.0);
    }
    let n = positions.len() as f32;
    let mean_x = positions.iter().map(|p| p.0).sum::<f32>() / n;
    let mean_y = positions.iter().map(|p| p.1).sum::<f32>() / n;
    let var_x = positions.iter().map(|p| (p.0 - mean_x).powi(2)).sum::<f32>() / n;
    let var_y = positions.iter().map(|p| (p.1 - mean_y).powi(2)).sum::<f32>() / n;
    (var_x.sqrt(), var_y.sqrt())
}
