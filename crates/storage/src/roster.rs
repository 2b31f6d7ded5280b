//! Filesystem student roster
//!
//! The enrollment database is a directory tree: `dataset/<student>/` holds
//! that student's face images. Directory presence is membership; no other
//! index exists.

use crate::models::Student;
use crate::StorageError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::warn;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Roster-wide statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct RosterStats {
    pub total_students: usize,
    pub total_images: usize,
    pub average_images_per_student: f32,
}

pub struct Roster {
    dataset_path: PathBuf,
}

impl Roster {
    /// Open (and create if needed) the dataset directory.
    pub fn new(dataset_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dataset_path = dataset_path.into();
        std::fs::create_dir_all(&dataset_path)?;
        Ok(Self { dataset_path })
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// All enrolled students, sorted by name.
    pub fn all_students(&self) -> Vec<Student> {
        let entries = match std::fs::read_dir(&self.dataset_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read roster directory: {}", e);
                return Vec::new();
            }
        };

        let mut students: Vec<Student> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| self.student(&e.file_name().to_string_lossy()))
            .collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        students
    }

    /// Single student lookup.
    pub fn student(&self, name: &str) -> Option<Student> {
        let dir = self.student_dir(name)?;
        if !dir.is_dir() {
            return None;
        }

        let images = self.student_images(name);
        let created_at = dir
            .metadata()
            .and_then(|m| m.created())
            .ok()
            .map(DateTime::<Utc>::from);
        let last_updated = images
            .iter()
            .filter_map(|img| dir.join(img).metadata().and_then(|m| m.modified()).ok())
            .max()
            .map(DateTime::<Utc>::from)
            .or(created_at);

        Some(Student {
            name: name.to_string(),
            image_count: images.len(),
            created_at,
            last_updated,
        })
    }

    pub fn student_exists(&self, name: &str) -> bool {
        self.student_dir(name).map_or(false, |d| d.is_dir())
    }

    /// Create the directory for a new student.
    pub fn add_student(&self, name: &str) -> Result<(), StorageError> {
        let dir = self
            .student_dir(name)
            .ok_or_else(|| StorageError::InvalidName(name.to_string()))?;
        std::fs::create_dir_all(dir)?;
        Ok(())
    }

    /// Remove a student and every enrolled image. Returns false when the
    /// student was not enrolled.
    pub fn delete_student(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self
            .student_dir(name)
            .ok_or_else(|| StorageError::InvalidName(name.to_string()))?;
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(dir)?;
        Ok(true)
    }

    /// Sorted image file names for a student.
    pub fn student_images(&self, name: &str) -> Vec<String> {
        let Some(dir) = self.student_dir(name) else {
            return Vec::new();
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut images: Vec<String> = entries
            .flatten()
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| {
                        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
                    })
            })
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        images.sort();
        images
    }

    pub fn stats(&self) -> RosterStats {
        let students = self.all_students();
        let total_students = students.len();
        let total_images: usize = students.iter().map(|s| s.image_count).sum();
        RosterStats {
            total_students,
            total_images,
            average_images_per_student: if total_students > 0 {
                total_images as f32 / total_students as f32
            } else {
                0.0
            },
        }
    }

    /// Reject names that would escape the dataset directory.
    fn student_dir(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return None;
        }
        Some(self.dataset_path.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_with_student(name: &str, images: &[&str]) -> (tempfile::TempDir, Roster) {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::new(dir.path()).unwrap();
        roster.add_student(name).unwrap();
        for img in images {
            std::fs::write(dir.path().join(name).join(img), b"fake").unwrap();
        }
        (dir, roster)
    }

    #[test]
    fn test_add_and_list_students() {
        let (_tmp, roster) = roster_with_student("alice", &["a.jpg", "b.png"]);
        roster.add_student("bob").unwrap();

        let students = roster.all_students();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].name, "alice");
        assert_eq!(students[0].image_count, 2);
        assert_eq!(students[1].image_count, 0);
    }

    #[test]
    fn test_non_image_files_ignored() {
        let (_tmp, roster) = roster_with_student("alice", &["a.jpg", "notes.txt"]);
        assert_eq!(roster.student_images("alice"), vec!["a.jpg"]);
    }

    #[test]
    fn test_delete_student() {
        let (_tmp, roster) = roster_with_student("alice", &["a.jpg"]);
        assert!(roster.delete_student("alice").unwrap());
        assert!(!roster.student_exists("alice"));
        assert!(!roster.delete_student("alice").unwrap());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::new(dir.path()).unwrap();
        assert!(roster.add_student("../evil").is_err());
        assert!(roster.student("..").is_none());
    }

    #[test]
    fn test_stats() {
        let (_tmp, roster) = roster_with_student("alice", &["a.jpg", "b.jpg"]);
        roster.add_student("bob").unwrap();

        let stats = roster.stats();
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.total_images, 2);
        assert!((stats.average_images_per_student - 1.0).abs() < f32::EPSILON);
    }
}
