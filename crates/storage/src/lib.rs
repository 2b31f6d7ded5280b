//! Persistence layer for the classroom pipeline
//!
//! - append-only CSV event log with bounded in-memory recent buffers
//! - filesystem student roster (one directory of images per student)
//! - CSV timetable lookup

pub mod logger;
pub mod models;
pub mod roster;
pub mod schedule;

pub use logger::{EventLog, LogKind};
pub use models::{
    AccessAction, AccessRecord, AttendanceRecord, AttentionSample, AttentionStatus, Emotion,
    EmotionRecord, Student,
};
pub use roster::{Roster, RosterStats};
pub use schedule::Schedule;

use thiserror::Error;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid student name: {0}")]
    InvalidName(String),
}
