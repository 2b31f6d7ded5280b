//! Capture device backends
//!
//! The real backend wraps `nokhwa`. `nokhwa::Camera` is `!Send`, so devices
//! are opened inside the capture thread, never handed across it. The
//! synthetic backend produces deterministic frames with a drifting textured
//! patch, which keeps the whole pipeline runnable headless.

use crate::frame::VideoFrame;
use crate::{CameraConfig, CameraError};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use tracing::{info, warn};

pub(crate) fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A blocking frame source
pub trait CaptureDevice {
    /// Blocking read of the next frame.
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Native resolution the device settled on.
    fn resolution(&self) -> (u32, u32);
}

/// Open a capture device, probing fallback indices when the preferred one
/// fails. Honors `config.synthetic`.
pub fn open_device(config: &CameraConfig) -> Result<Box<dyn CaptureDevice>, CameraError> {
    if config.synthetic {
        info!("Opening synthetic capture device");
        return Ok(Box::new(SyntheticDevice::new(
            config.stream_width,
            config.stream_height,
        )));
    }

    let mut indices = vec![config.device_index];
    indices.extend((0..=config.max_probe_index).filter(|&i| i != config.device_index));

    for index in indices {
        match WebcamDevice::open(index, config) {
            Ok(device) => {
                info!("Camera opened at index {}", index);
                return Ok(Box::new(device));
            }
            Err(e) => {
                warn!("Camera index {} unavailable: {}", index, e);
            }
        }
    }

    Err(CameraError::DeviceUnavailable(0, config.max_probe_index))
}

/// Webcam backend over `nokhwa`
pub struct WebcamDevice {
    camera: Camera,
    sequence: u64,
}

impl WebcamDevice {
    /// Open the device at `index`, requesting the streaming resolution and
    /// FPS so the driver keeps its internal buffering minimal.
    pub fn open(index: u32, config: &CameraConfig) -> Result<Self, CameraError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.stream_width, config.stream_height),
                FrameFormat::MJPEG,
                config.target_fps,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| CameraError::Open(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::Open(e.to_string()))?;

        Ok(Self {
            camera,
            sequence: 0,
        })
    }
}

impl CaptureDevice for WebcamDevice {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::Read(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::Decode(e.to_string()))?;

        self.sequence += 1;
        Ok(VideoFrame::new(
            decoded.as_raw().clone(),
            decoded.width(),
            decoded.height(),
            epoch_ms(),
            self.sequence,
        ))
    }

    fn resolution(&self) -> (u32, u32) {
        let res = self.camera.resolution();
        (res.width(), res.height())
    }
}

/// Deterministic synthetic backend
///
/// Renders a vertical luminance gradient with a high-contrast checkerboard
/// patch whose position drifts with the sequence number, so detection and
/// attention jitter both have something real to measure.
pub struct SyntheticDevice {
    width: u32,
    height: u32,
    sequence: u64,
}

impl SyntheticDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
        }
    }

    /// Patch size in pixels.
    pub const PATCH: u32 = 64;

    /// Top-left corner of the patch for a given sequence number.
    pub fn patch_origin(&self, sequence: u64) -> (u32, u32) {
        let x = self.width / 4 + ((sequence * 7) % 31) as u32;
        let y = self.height / 4 + ((sequence * 5) % 23) as u32;
        (x, y)
    }

    fn render(&self, sequence: u64) -> VideoFrame {
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        let (px, py) = self.patch_origin(sequence);

        for y in 0..self.height {
            let background = ((y as f32 / self.height as f32) * 255.0) as u8;
            for x in 0..self.width {
                let in_patch = x >= px
                    && x < (px + Self::PATCH).min(self.width)
                    && y >= py
                    && y < (py + Self::PATCH).min(self.height);
                let value = if in_patch {
                    // 8px checkerboard cells, strong local contrast
                    if ((x - px) / 8 + (y - py) / 8) % 2 == 0 {
                        40
                    } else {
                        210
                    }
                } else {
                    background
                };
                data.extend_from_slice(&[value, value, value]);
            }
        }

        VideoFrame::new(data, self.width, self.height, epoch_ms(), sequence)
    }
}

impl CaptureDevice for SyntheticDevice {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        self.sequence += 1;
        Ok(self.render(self.sequence))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frames_advance() {
        let mut device = SyntheticDevice::new(64, 48);
        let a = device.read_frame().unwrap();
        let b = device.read_frame().unwrap();
        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        assert_eq!(a.data.len(), 64 * 48 * 3);
    }

    #[test]
    fn test_synthetic_patch_has_contrast() {
        let mut device = SyntheticDevice::new(320, 240);
        let frame = device.read_frame().unwrap();
        let (px, py) = device.patch_origin(1);
        let patch = frame
            .crop_box(&crate::FaceBox::new(px, py, SyntheticDevice::PATCH, SyntheticDevice::PATCH))
            .unwrap();
        let (mean, std) = patch.intensity_stats();
        assert!(std > 50.0, "checkerboard should be high-variance, got {std}");
        assert!(mean > 60.0 && mean < 190.0);
    }

    #[test]
    fn test_patch_origin_drifts() {
        let device = SyntheticDevice::new(320, 240);
        assert_ne!(device.patch_origin(1), device.patch_origin(2));
    }
}
