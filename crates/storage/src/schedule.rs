//! Timetable lookup
//!
//! The schedule is a CSV of `name,date,start,end,course,room` rows. A
//! missing file means "no schedule", not an error; attendance is still
//! recorded, just without a course.

use chrono::{DateTime, Local};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct ScheduleRow {
    name: String,
    date: String,
    start: String,
    end: String,
    course: String,
    room: String,
}

#[derive(Debug, Default)]
pub struct Schedule {
    rows: Vec<ScheduleRow>,
}

impl Schedule {
    /// Load the timetable. Unparseable rows are skipped with a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                info!("No timetable at {}, attendance will have no course", path.display());
                return Self::default();
            }
        };

        let mut rows = Vec::new();
        for (lineno, line) in content.lines().enumerate().skip(1) {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 6 {
                if !line.trim().is_empty() {
                    warn!("Skipping malformed timetable row {}", lineno + 1);
                }
                continue;
            }
            rows.push(ScheduleRow {
                name: fields[0].to_string(),
                date: fields[1].to_string(),
                start: fields[2].to_string(),
                end: fields[3].to_string(),
                course: fields[4].to_string(),
                room: fields[5].to_string(),
            });
        }

        info!("Timetable loaded: {} rows", rows.len());
        Self { rows }
    }

    /// The course and room a student is scheduled in at `now`, if any.
    pub fn current_class(&self, student: &str, now: DateTime<Local>) -> Option<(String, String)> {
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M").to_string();

        self.rows
            .iter()
            .find(|row| {
                row.name.eq_ignore_ascii_case(student)
                    && row.date == date
                    && row.start.as_str() <= time.as_str()
                    && time.as_str() <= row.end.as_str()
            })
            .map(|row| (row.course.clone(), row.room.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
