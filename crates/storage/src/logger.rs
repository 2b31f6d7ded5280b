//! Append-only CSV event log
//!
//! One CSV file per record kind, headers written on first creation, plus a
//! bounded in-memory recent buffer per kind for the dashboard. Writes are
//! fire-and-forget from the pipeline's point of view: I/O failures are
//! logged and swallowed, never surfaced into a worker loop.

use crate::models::{AccessRecord, AttendanceRecord, AttentionSample, EmotionRecord};
use crate::StorageError;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Record kinds served by `recent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Attendance,
    Attention,
    Emotions,
    Access,
}

impl LogKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "attendance" => Some(LogKind::Attendance),
            "attention" => Some(LogKind::Attention),
            "emotions" => Some(LogKind::Emotions),
            "access" => Some(LogKind::Access),
            _ => None,
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            LogKind::Attendance => "attendance.csv",
            LogKind::Attention => "attention.csv",
            LogKind::Emotions => "emotions.csv",
            LogKind::Access => "access.csv",
        }
    }

    fn header(&self) -> &'static str {
        match self {
            LogKind::Attendance => "timestamp,student_name,has_class,course,classroom",
            LogKind::Attention => "timestamp,student_name,status,std_x,std_y",
            LogKind::Emotions => "timestamp,student_name,emotion,confidence",
            LogKind::Access => "timestamp,student_name,action,reason",
        }
    }
}

const ALL_KINDS: [LogKind; 4] = [
    LogKind::Attendance,
    LogKind::Attention,
    LogKind::Emotions,
    LogKind::Access,
];

/// Max records retained in memory per kind
const RECENT_CAPACITY: usize = 1000;

pub struct EventLog {
    logs_dir: PathBuf,
    recent: [Mutex<VecDeque<serde_json::Value>>; 4],
}

impl EventLog {
    /// Create the logs directory and CSV files with headers when missing.
    pub fn new(logs_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let logs_dir = logs_dir.into();
        std::fs::create_dir_all(&logs_dir)?;

        for kind in ALL_KINDS {
            let path = logs_dir.join(kind.file_name());
            if !path.exists() {
                let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
                writeln!(file, "{}", kind.header())?;
            }
        }

        info!("Event log initialized at {}", logs_dir.display());
        Ok(Self {
            logs_dir,
            recent: [
                Mutex::new(VecDeque::with_capacity(64)),
                Mutex::new(VecDeque::with_capacity(64)),
                Mutex::new(VecDeque::with_capacity(64)),
                Mutex::new(VecDeque::with_capacity(64)),
            ],
        })
    }

    pub fn log_attendance(&self, record: &AttendanceRecord) {
        self.append(
            LogKind::Attendance,
            &[
                &record.timestamp.to_rfc3339(),
                &record.student_name,
                &record.has_class.to_string(),
                record.course.as_deref().unwrap_or(""),
                record.classroom.as_deref().unwrap_or(""),
            ],
            serde_json::to_value(record),
        );
        info!(
            "Attendance: {} ({})",
            record.student_name,
            record.course.as_deref().unwrap_or("no class")
        );
    }

    pub fn log_attention(&self, record: &AttentionSample) {
        self.append(
            LogKind::Attention,
            &[
                &record.timestamp.to_rfc3339(),
                &record.student_name,
                record.status.as_str(),
                &format!("{:.2}", record.std_x),
                &format!("{:.2}", record.std_y),
            ],
            serde_json::to_value(record),
        );
    }

    pub fn log_emotion(&self, record: &EmotionRecord) {
        self.append(
            LogKind::Emotions,
            &[
                &record.timestamp.to_rfc3339(),
                &record.student_name,
                record.emotion.as_str(),
                &format!("{:.2}", record.confidence),
            ],
            serde_json::to_value(record),
        );
    }

    pub fn log_access(&self, record: &AccessRecord) {
        self.append(
            LogKind::Access,
            &[
                &record.timestamp.to_rfc3339(),
                record.student_name.as_deref().unwrap_or(""),
                record.action.as_str(),
                &record.reason,
            ],
            serde_json::to_value(record),
        );
        info!(
            "Access: {} - {}",
            record.action.as_str(),
            record.student_name.as_deref().unwrap_or("unknown")
        );
    }

    /// Most recent in-memory records of a kind, newest first.
    pub fn recent(&self, kind: LogKind, limit: usize) -> Vec<serde_json::Value> {
        let buffer = self.recent_buffer(kind).lock().unwrap_or_else(|e| e.into_inner());
        buffer.iter().rev().take(limit).cloned().collect()
    }

    /// In-memory record count for a kind.
    pub fn count(&self, kind: LogKind) -> usize {
        self.recent_buffer(kind)
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    fn recent_buffer(&self, kind: LogKind) -> &Mutex<VecDeque<serde_json::Value>> {
        let idx = ALL_KINDS.iter().position(|k| *k == kind).unwrap_or(0);
        &self.recent[idx]
    }

    fn append(
        &self,
        kind: LogKind,
        fields: &[&str],
        json: Result<serde_json::Value, serde_json::Error>,
    ) {
        let line = fields.iter().map(|f| escape_csv(f)).collect::<Vec<_>>().join(",");
        let path = self.logs_dir.join(kind.file_name());

        let write = OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = write {
            warn!("Failed to append {}: {}", kind.file_name(), e);
        }

        if let Ok(value) = json {
            let mut buffer = self.recent_buffer(kind).lock().unwrap_or_else(|e| e.into_inner());
            while buffer.len() >= RECENT_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(value);
        }
    }
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessAction, AttentionStatus, Emotion};
    use chrono::Utc;

    fn attendance(name: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_name: name.to_string(),
            timestamp: Utc::now(),
            has_class: true,
            course: Some("Algorithms".to_string()),
            classroom: Some("B204".to_string()),
        }
    }

    #[test]
    fn test_creates_files_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let _log = EventLog::new(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join("attendance.csv")).unwrap();
        assert!(content.starts_with("timestamp,student_name,has_class"));
    }

    #[test]
    fn test_append_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path()).unwrap();

        log.log_attendance(&attendance("Alice"));
        log.log_attendance(&attendance("Bob"));

        let recent = log.recent(LogKind::Attendance, 10);
        assert_eq!(recent.len(), 2);
        // Newest first
        assert_eq!(recent[0]["student_name"], "Bob");

        let content = std::fs::read_to_string(dir.path().join("attendance.csv")).unwrap();
        assert_eq!(content.lines().count(), 3); // header + 2 records
    }

    #[test]
    fn test_kinds_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path()).unwrap();

        log.log_attendance(&attendance("Alice"));
        log.log_emotion(&EmotionRecord {
            student_name: "Alice".to_string(),
            timestamp: Utc::now(),
            emotion: Emotion::Happy,
            confidence: 82.0,
        });
        log.log_attention(&AttentionSample {
            student_name: "Alice".to_string(),
            timestamp: Utc::now(),
            status: AttentionStatus::Focused,
            std_x: 3.2,
            std_y: 1.1,
        });
        log.log_access(&AccessRecord {
            timestamp: Utc::now(),
            student_name: None,
            action: AccessAction::Denied,
            reason: "unknown".to_string(),
        });

        assert_eq!(log.count(LogKind::Attendance), 1);
        assert_eq!(log.count(LogKind::Emotions), 1);
        assert_eq!(log.count(LogKind::Attention), 1);
        assert_eq!(log.count(LogKind::Access), 1);
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(LogKind::from_name("attendance"), Some(LogKind::Attendance));
        assert_eq!(LogKind::from_name("emotions"), Some(LogKind::Emotions));
        assert_eq!(LogKind::from_name("bogus"), None);
    }
}
