//! Recognition boundary
//!
//! `Recognizer` is the seam the pipeline calls through; its latency is
//! unbounded by contract, which is why the automatic path always invokes it
//! under a timeout. The filesystem matcher compares intensity embeddings
//! against every enrolled image, best cosine similarity wins.

use crate::VisionError;
use camera_capture::VideoFrame;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Embedding edge length; faces are reduced to EMBED_DIM^2 intensities.
const EMBED_DIM: u32 = 16;

/// Tagged recognition result.
///
/// Replaces stringly sentinels: a non-match is a variant, not a reserved
/// name that could collide with a real student.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// A database hit at or above the confidence threshold
    Match { name: String, confidence: f32 },
    /// A face that matched nobody well enough
    Unknown,
    /// No enrolled students or no enrolled images
    EmptyDatabase,
}

/// The opaque recognition collaborator
pub trait Recognizer: Send + Sync {
    fn recognize(&self, face: &VideoFrame) -> Result<Recognition, VisionError>;
}

/// Matcher over the filesystem enrollment database (`dataset/<name>/*.jpg`).
pub struct FilesystemRecognizer {
    dataset_path: PathBuf,
    /// Minimum 0-100 score for a match
    threshold: f32,
}

impl FilesystemRecognizer {
    pub fn new(dataset_path: impl Into<PathBuf>, threshold: f32) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            threshold,
        }
    }

    fn enrolled_dirs(&self) -> Result<Vec<PathBuf>, VisionError> {
        let entries = std::fs::read_dir(&self.dataset_path)
            .map_err(|e| VisionError::Database(e.to_string()))?;
        Ok(entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect())
    }

    fn image_embedding(path: &Path) -> Option<Vec<f32>> {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping unreadable enrollment image {}: {}", path.display(), e);
                return None;
            }
        };
        let gray = image::imageops::resize(
            &img.to_luma8(),
            EMBED_DIM,
            EMBED_DIM,
            image::imageops::FilterType::Triangle,
        );
        Some(embed(gray.as_raw()))
    }
}

impl Recognizer for FilesystemRecognizer {
    fn recognize(&self, face: &VideoFrame) -> Result<Recognition, VisionError> {
        let dirs = self.enrolled_dirs()?;
        if dirs.is_empty() {
            return Ok(Recognition::EmptyDatabase);
        }

        let probe = embed_frame(face);
        let mut best: Option<(String, f32)> = None;
        let mut total_images = 0usize;

        for dir in dirs {
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let is_image = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| {
                        matches!(e.to_lowercase().as_str(), "jpg" | "jpeg" | "png")
                    });
                if !is_image {
                    continue;
                }
                let Some(enrolled) = Self::image_embedding(&path) else {
                    continue;
                };
                total_images += 1;

                let similarity = cosine_similarity(&probe, &enrolled);
                if best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                    best = Some((name.clone(), similarity));
                }
            }
        }

        if total_images == 0 {
            return Ok(Recognition::EmptyDatabase);
        }

        match best {
            Some((name, similarity)) => {
                let score = (similarity * 100.0).clamp(0.0, 100.0);
                debug!("Best match {} at score {:.1}", name, score);
                if score >= self.threshold {
                    Ok(Recognition::Match {
                        name,
                        confidence: score,
                    })
                } else {
                    Ok(Recognition::Unknown)
                }
            }
            None => Ok(Recognition::Unknown),
        }
    }
}

/// Reduce a frame to its intensity embedding.
pub fn embed_frame(frame: &VideoFrame) -> Vec<f32> {
    let small = frame.resize(EMBED_DIM, EMBED_DIM);
    embed(&small.to_grayscale())
}

/// Mean-centered intensity vector; cosine over these behaves like a
/// correlation of the two patterns.
fn embed(gray: &[u8]) -> Vec<f32> {
    let mean = gray.iter().map(|&v| v as f32).sum::<f32>() / gray.len().max(1) as f32;
    gray.iter().map(|&v| v as f32 - mean).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn checkerboard_frame() -> VideoFrame {
        let (w, h) = (64u32, 64u32);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = if (x / 8 + y / 8) % 2 == 0 { 40 } else { 210 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        VideoFrame::new(data, w, h, 0, 1)
    }

    fn save_checkerboard(path: &Path) {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            Luma([if (x / 8 + y / 8) % 2 == 0 { 40u8 } else { 210u8 }])
        });
        img.save(path).unwrap();
    }

    fn save_gradient(path: &Path) {
        let img = ImageBuffer::from_fn(64, 64, |_x, y| Luma([(y * 4) as u8]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = FilesystemRecognizer::new(dir.path(), 60.0);
        let result = recognizer.recognize(&checkerboard_frame()).unwrap();
        assert_eq!(result, Recognition::EmptyDatabase);
    }

    #[test]
    fn test_enrolled_student_without_images_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alice")).unwrap();

        let recognizer = FilesystemRecognizer::new(dir.path(), 60.0);
        let result = recognizer.recognize(&checkerboard_frame()).unwrap();
        assert_eq!(result, Recognition::EmptyDatabase);
    }

    #[test]
    fn test_matches_enrolled_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alice")).unwrap();
        save_checkerboard(&dir.path().join("alice").join("face.png"));
        std::fs::create_dir(dir.path().join("bob")).unwrap();
        save_gradient(&dir.path().join("bob").join("face.png"));

        let recognizer = FilesystemRecognizer::new(dir.path(), 60.0);
        match recognizer.recognize(&checkerboard_frame()).unwrap() {
            Recognition::Match { name, confidence } => {
                assert_eq!(name, "alice");
                assert!(confidence > 75.0, "self-match should score high, got {confidence}");
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_face_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bob")).unwrap();
        save_gradient(&dir.path().join("bob").join("face.png"));

        // Flat probe has zero variance, so it correlates with nothing
        let flat = VideoFrame::new(vec![128; 64 * 64 * 3], 64, 64, 0, 1);
        let recognizer = FilesystemRecognizer::new(dir.path(), 60.0);
        assert_eq!(recognizer.recognize(&flat).unwrap(), Recognition::Unknown);
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = vec![1.0, 0.0, -1.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }
}
