//! Face detection
//!
//! Detection runs on a downscaled grayscale copy and rescales hits back to
//! frame coordinates, keeping the per-frame cost well under the capture
//! cadence. The detector is deterministic: the same frame always yields the
//! same boxes.

use camera_capture::{FaceBox, VideoFrame};
use tracing::debug;

/// Detector tuning
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Width the frame is downscaled to before scanning
    pub scan_width: u32,
    /// Scan window edge length (downscaled pixels)
    pub window: u32,
    /// Scan stride (downscaled pixels)
    pub stride: u32,
    /// Minimum local standard deviation for a window to be face-like
    pub std_threshold: f32,
    /// Acceptable mean luminance band
    pub mean_min: f32,
    pub mean_max: f32,
    /// Minimum merged box edge (downscaled pixels); smaller hits are noise
    pub min_box: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scan_width: 320,
            window: 16,
            stride: 8,
            std_threshold: 28.0,
            mean_min: 50.0,
            mean_max: 200.0,
            min_box: 24,
        }
    }
}

pub struct FaceDetector {
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
        }
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Detect face-like regions in a frame.
    ///
    /// Boxes are axis-aligned, non-negative, and within frame bounds.
    pub fn detect(&self, frame: &VideoFrame) -> Vec<FaceBox> {
        if frame.width == 0 || frame.height == 0 {
            return Vec::new();
        }

        let cfg = &self.config;
        let scale = if frame.width > cfg.scan_width {
            frame.width as f32 / cfg.scan_width as f32
        } else {
            1.0
        };
        let small = if scale > 1.0 {
            frame.resize(
                cfg.scan_width,
                ((frame.height as f32 / scale) as u32).max(1),
            )
        } else {
            frame.clone()
        };

        let gray = small.to_grayscale();
        let candidates = self.scan_windows(&gray, small.width, small.height);
        let merged = merge_rects(candidates);

        let boxes: Vec<FaceBox> = merged
            .into_iter()
            .filter(|r| r.2 >= cfg.min_box && r.3 >= cfg.min_box)
            .map(|(x, y, w, h)| {
                let fx = ((x as f32 * scale) as u32).min(frame.width.saturating_sub(1));
                let fy = ((y as f32 * scale) as u32).min(frame.height.saturating_sub(1));
                let fw = ((w as f32 * scale) as u32).min(frame.width - fx);
                let fh = ((h as f32 * scale) as u32).min(frame.height - fy);
                FaceBox::new(fx, fy, fw, fh)
            })
            .collect();

        if !boxes.is_empty() {
            debug!("Detected {} face region(s) in frame {}", boxes.len(), frame.sequence);
        }
        boxes
    }

    /// Windows whose texture statistics look face-like.
    fn scan_windows(&self, gray: &[u8], width: u32, height: u32) -> Vec<(u32, u32, u32, u32)> {
        let cfg = &self.config;
        let mut hits = Vec::new();

        if width < cfg.window || height < cfg.window {
            return hits;
        }

        let mut y = 0;
        while y + cfg.window <= height {
            let mut x = 0;
            while x + cfg.window <= width {
                let (mean, std) = window_stats(gray, width, x, y, cfg.window);
                if std > cfg.std_threshold && mean > cfg.mean_min && mean < cfg.mean_max {
                    hits.push((x, y, cfg.window, cfg.window));
                }
                x += cfg.stride;
            }
            y += cfg.stride;
        }
        hits
    }
}

impl Default for FaceDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn window_stats(gray: &[u8], width: u32, x: u32, y: u32, window: u32) -> (f32, f32) {
    let n = (window * window) as f32;
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;

    for row in y..y + window {
        let base = (row * width + x) as usize;
        for &value in &gray[base..base + window as usize] {
            let v = value as f32;
            sum += v;
            sum_sq += v * v;
        }
    }

    let mean = sum / n;
    let var = (sum_sq / n - mean * mean).max(0.0);
    (mean, var.sqrt())
}

/// Merge intersecting (or touching) rects until a fixed point.
fn merge_rects(mut rects: Vec<(u32, u32, u32, u32)>) -> Vec<(u32, u32, u32, u32)> {
    loop {
        let mut merged_any = false;
        let mut out: Vec<(u32, u32, u32, u32)> = Vec::with_capacity(rects.len());

        'outer: for rect in rects {
            for existing in out.iter_mut() {
                if touches(*existing, rect) {
                    *existing = union(*existing, rect);
                    merged_any = true;
                    continue 'outer;
                }
            }
            out.push(rect);
        }

        rects = out;
        if !merged_any {
            return rects;
        }
    }
}

fn touches(a: (u32, u32, u32, u32), b: (u32, u32, u32, u32)) -> bool {
    a.0 <= b.0 + b.2 && b.0 <= a.0 + a.2 && a.1 <= b.1 + b.3 && b.1 <= a.1 + a.3
}

fn union(a: (u32, u32, u32, u32), b: (u32, u32, u32, u32)) -> (u32, u32, u32, u32) {
    let x = a.0.min(b.0);
    let y = a.1.min(b.1);
    let right = (a.0 + a.2).max(b.0 + b.2);
    let bottom = (a.1 + a.3).max(b.1 + b.3);
    (x, y, right - x, bottom - y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::device::CaptureDevice;
    use camera_capture::SyntheticDevice;

    #[test]
    fn test_detects_synthetic_patch() {
        let mut device = SyntheticDevice::new(640, 480);
        let frame = device.read_frame().unwrap();

        let detector = FaceDetector::new();
        let boxes = detector.detect(&frame);
        assert_eq!(boxes.len(), 1, "expected exactly the checkerboard patch");

        let (px, py) = device.patch_origin(frame.sequence);
        let b = boxes[0];
        // The detected box must overlap the known patch position
        assert!(b.x < px + SyntheticDevice::PATCH && b.x + b.width > px);
        assert!(b.y < py + SyntheticDevice::PATCH && b.y + b.height > py);
    }

    #[test]
    fn test_deterministic_for_same_frame() {
        let mut device = SyntheticDevice::new(640, 480);
        let frame = device.read_frame().unwrap();

        let detector = FaceDetector::new();
        assert_eq!(detector.detect(&frame), detector.detect(&frame));
    }

    #[test]
    fn test_flat_frame_has_no_faces() {
        let frame = VideoFrame::new(vec![128; 320 * 240 * 3], 320, 240, 0, 1);
        let detector = FaceDetector::new();
        assert!(detector.detect(&frame).is_empty());
    }

    #[test]
    fn test_boxes_within_frame_bounds() {
        let mut device = SyntheticDevice::new(640, 480);
        let frame = device.read_frame().unwrap();
        for b in FaceDetector::new().detect(&frame) {
            assert!(b.x + b.width <= frame.width);
            assert!(b.y + b.height <= frame.height);
        }
    }

    #[test]
    fn test_merge_rects_unions_overlaps() {
        let merged = merge_rects(vec![(0, 0, 16, 16), (8, 8, 16, 16), (100, 100, 16, 16)]);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&(0, 0, 24, 24)));
    }
}
