//! Record models shared across the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attention status derived from face-position jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionStatus {
    Focused,
    Distracted,
    /// Not enough history yet
    Collecting,
    /// History present but too sparse to judge
    Insufficient,
}

impl AttentionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionStatus::Focused => "focused",
            AttentionStatus::Distracted => "distracted",
            AttentionStatus::Collecting => "collecting",
            AttentionStatus::Insufficient => "insufficient",
        }
    }
}

/// Emotion classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Fear,
    Surprise,
    Disgust,
    Neutral,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Disgust => "disgust",
            Emotion::Neutral => "neutral",
        }
    }
}

/// Door access outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Granted,
    Denied,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Granted => "granted",
            AccessAction::Denied => "denied",
        }
    }
}

/// Roster entry backed by a dataset directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    pub image_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One attendance event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_name: String,
    pub timestamp: DateTime<Utc>,
    pub has_class: bool,
    pub course: Option<String>,
    pub classroom: Option<String>,
}

/// One attention measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionSample {
    pub student_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttentionStatus,
    pub std_x: f32,
    pub std_y: f32,
}

/// One emotion measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub student_name: String,
    pub timestamp: DateTime<Utc>,
    pub emotion: Emotion,
    pub confidence: f32,
}

/// One door access event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub timestamp: DateTime<Utc>,
    pub student_name: Option<String>,
    pub action: AccessAction,
    pub reason: String,
}
