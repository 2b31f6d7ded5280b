//! Simplified emotion heuristics
//!
//! Not a model call: emotion is picked from a weighted pool keyed on a hash
//! of the face's intensity statistics, so the same face in the same light
//! yields the same answer. The analyzer rate-limits itself per identity and
//! returns `None` inside the window.

use camera_capture::VideoFrame;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use storage::Emotion;
use tracing::debug;

/// Weighted emotion pool (percent)
const EMOTION_POOL: [(Emotion, u64); 7] = [
    (Emotion::Neutral, 40),
    (Emotion::Happy, 25),
    (Emotion::Surprise, 15),
    (Emotion::Sad, 10),
    (Emotion::Angry, 5),
    (Emotion::Fear, 3),
    (Emotion::Disgust, 2),
];

/// One emotion estimate
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScore {
    pub emotion: Emotion,
    pub confidence: f32,
}

pub struct EmotionAnalyzer {
    interval: Duration,
    last_analysis: Mutex<HashMap<String, Instant>>,
}

impl EmotionAnalyzer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_analysis: Mutex::new(HashMap::new()),
        }
    }

    /// Analyze a face crop for `name`.
    ///
    /// Returns `None` for empty crops and inside the per-identity interval.
    pub fn analyze(&self, face: &VideoFrame, name: &str) -> Option<EmotionScore> {
        if face.data.is_empty() {
            return None;
        }

        {
            let mut last = self.last_analysis.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(at) = last.get(name) {
                if at.elapsed() < self.interval {
                    return None;
                }
            }
            last.insert(name.to_string(), Instant::now());
        }

        let (mean, std) = face.intensity_stats();

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        (mean as u32).hash(&mut hasher);
        (std as u32).hash(&mut hasher);
        face.sequence.hash(&mut hasher);
        let hash = hasher.finish();

        let emotion = pick_weighted(hash % 100);

        // Confidence tracks image quality, bounded to 60-95
        let base = (mean / 2.0 + std / 3.0).clamp(60.0, 90.0);
        let wobble = ((hash >> 8) % 21) as f32 - 10.0;
        let confidence = (base + wobble).clamp(60.0, 95.0);

        debug!("Emotion for {}: {} ({:.1}%)", name, emotion.as_str(), confidence);
        Some(EmotionScore {
            emotion,
            confidence,
        })
    }
}

impl Default for EmotionAnalyzer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn pick_weighted(roll: u64) -> Emotion {
    let mut cumulative = 0;
    for (emotion, weight) in EMOTION_POOL {
        cumulative += weight;
        if roll < cumulative {
            return emotion;
        }
    }
    Emotion::Neutral
}
