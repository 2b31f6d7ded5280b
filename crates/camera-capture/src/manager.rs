//! Camera manager and capture loop

use crate::device::{open_device, CaptureDevice};
use crate::frame::VideoFrame;
use crate::{CameraConfig, CameraError};
use handoff::LatestSlot;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frame-ready callback, invoked on every 3rd captured frame.
pub type FrameCallback = Arc<dyn Fn(&VideoFrame) + Send + Sync>;

/// Handle returned by `add_callback`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

/// How long `start` waits for the capture thread to report readiness.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded join on `stop`; the thread is abandoned past this.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum consecutive throttle cycles skipped when behind schedule.
const MAX_CATCHUP_SKIPS: u32 = 2;

/// Camera performance snapshot
#[derive(Debug, Clone)]
pub struct CameraStats {
    pub is_active: bool,
    pub frame_count: u64,
    pub fps: f32,
    pub target_fps: u32,
    pub resolution: String,
    pub callback_count: usize,
    pub buffer_len: usize,
    pub has_frame: bool,
}

struct Shared {
    active: AtomicBool,
    frame: Mutex<Option<VideoFrame>>,
    fresh: LatestSlot<VideoFrame>,
    frame_count: AtomicU64,
    fps: Mutex<f32>,
    callbacks: Mutex<Vec<(u64, FrameCallback)>>,
}

/// Owns the capture device and the dedicated capture thread.
///
/// The thread is the only writer of the current-frame cell; every reader
/// receives a copy, so no consumer can observe a partially overwritten
/// buffer or hold a reference past the next capture cycle.
pub struct CameraManager {
    config: CameraConfig,
    shared: Arc<Shared>,
    next_callback_id: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CameraManager {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                active: AtomicBool::new(false),
                frame: Mutex::new(None),
                fresh: LatestSlot::new(),
                frame_count: AtomicU64::new(0),
                fps: Mutex::new(0.0),
                callbacks: Mutex::new(Vec::new()),
            }),
            next_callback_id: AtomicU64::new(1),
            thread: Mutex::new(None),
        }
    }

    /// Start the capture thread.
    ///
    /// Opens the device (probing fallback indices), verifies one test read,
    /// then hands the device to the capture loop. Calling start on an
    /// already-active manager is a no-op returning Ok.
    pub fn start(&self) -> Result<(), CameraError> {
        let mut thread_slot = self.thread.lock().unwrap_or_else(|e| e.into_inner());

        if self.shared.active.load(Ordering::SeqCst) {
            info!("Camera already active");
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u32), CameraError>>();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();

        shared.active.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || {
                // The device lives on this thread only (nokhwa handles are !Send).
                let mut device = match open_device(&config) {
                    Ok(d) => d,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Verification read before reporting readiness
                match device.read_frame() {
                    Ok(_) => {
                        let _ = ready_tx.send(Ok(device.resolution()));
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                }

                capture_loop(&shared, &config, device.as_mut());
                debug!("Capture loop exited");
            })
            .map_err(|e| CameraError::Open(e.to_string()))?;

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok((width, height))) => {
                info!(
                    "Camera configured: {}x{} streaming at {}x{} @ {}fps",
                    width,
                    height,
                    self.config.stream_width,
                    self.config.stream_height,
                    self.config.target_fps
                );
                *thread_slot = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.shared.active.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.shared.active.store(false, Ordering::SeqCst);
                Err(CameraError::StartupTimeout)
            }
        }
    }

    /// Defensive copy of the most recent frame.
    pub fn get_frame(&self) -> Option<VideoFrame> {
        self.shared
            .frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Lowest-latency frame access: freshness buffer first, then the cell.
    pub fn get_latest_frame_fast(&self) -> Option<VideoFrame> {
        self.shared.fresh.try_take().or_else(|| self.get_frame())
    }

    /// Register a frame callback. Callbacks run on the capture thread and
    /// only on every 3rd frame; a panicking callback is isolated and logged.
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&VideoFrame) + Send + Sync + 'static,
    {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let mut callbacks = self
            .shared
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        callbacks.push((id, Arc::new(callback)));
        debug!("Frame callback {} registered ({} total)", id, callbacks.len());
        CallbackId(id)
    }

    /// Unregister a callback by its handle.
    pub fn remove_callback(&self, id: CallbackId) {
        let mut callbacks = self
            .shared
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        callbacks.retain(|(cb_id, _)| *cb_id != id.0);
    }

    /// Stop the capture loop and release the device.
    ///
    /// Cooperative: flips the flag, joins with a bounded timeout, abandons
    /// the thread if the join expires. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping camera");

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Capture thread did not exit within {:?}, abandoning", JOIN_TIMEOUT);
            }
        }

        *self.shared.frame.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.shared.fresh.clear();
        self.shared.frame_count.store(0, Ordering::SeqCst);
        *self.shared.fps.lock().unwrap_or_else(|e| e.into_inner()) = 0.0;

        info!("Camera stopped");
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn frame_count(&self) -> u64 {
        self.shared.frame_count.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            is_active: self.is_active(),
            frame_count: self.frame_count(),
            fps: *self.shared.fps.lock().unwrap_or_else(|e| e.into_inner()),
            target_fps: self.config.target_fps,
            resolution: format!("{}x{}", self.config.stream_width, self.config.stream_height),
            callback_count: self
                .shared
                .callbacks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            buffer_len: self.shared.fresh.len(),
            has_frame: self
                .shared
                .frame
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .is_some(),
        }
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(shared: &Shared, config: &CameraConfig, device: &mut dyn CaptureDevice) {
    let frame_delay = Duration::from_secs_f32(1.0 / config.target_fps.max(1) as f32);
    let mut last_frame_time = Instant::now();
    let mut skip_count = 0u32;
    let mut fps_window_start = Instant::now();
    let mut fps_frames = 0u32;

    while shared.active.load(Ordering::SeqCst) {
        match device.read_frame() {
            Ok(raw) => {
                let frame = if raw.width != config.stream_width || raw.height != config.stream_height
                {
                    raw.resize(config.stream_width, config.stream_height)
                } else {
                    raw
                };

                // Copy-on-publish into the shared cell, then the depth-1
                // freshness buffer (drain-then-insert, never blocking).
                {
                    let mut cell = shared.frame.lock().unwrap_or_else(|e| e.into_inner());
                    *cell = Some(frame.clone());
                }
                shared.fresh.publish(frame.clone());

                let count = shared.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
                fps_frames += 1;

                let window = fps_window_start.elapsed();
                if window >= Duration::from_secs(1) {
                    let fps = fps_frames as f32 / window.as_secs_f32();
                    *shared.fps.lock().unwrap_or_else(|e| e.into_inner()) = fps;
                    fps_frames = 0;
                    fps_window_start = Instant::now();
                }

                // Callback fan-out, 1 frame in 3
                if count % 3 == 0 {
                    let callbacks: Vec<(u64, FrameCallback)> = shared
                        .callbacks
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .clone();
                    for (id, callback) in callbacks {
                        let outcome =
                            std::panic::catch_unwind(AssertUnwindSafe(|| callback(&frame)));
                        if outcome.is_err() {
                            warn!("Frame callback {} panicked, isolated", id);
                        }
                    }
                }

                // Elapsed-aware throttle with bounded catch-up
                let elapsed = last_frame_time.elapsed();
                if elapsed < frame_delay {
                    std::thread::sleep(frame_delay - elapsed);
                    skip_count = 0;
                } else if elapsed > frame_delay * 2 && skip_count < MAX_CATCHUP_SKIPS {
                    skip_count += 1;
                    last_frame_time = Instant::now();
                    continue;
                } else {
                    skip_count = 0;
                }
                last_frame_time = Instant::now();
            }
            Err(e) => {
                // Transient: log, pause, keep the loop alive
                warn!("Capture read failed: {}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_config() -> CameraConfig {
        CameraConfig {
            stream_width: 320,
            stream_height: 240,
            target_fps: 60,
            ..CameraConfig::synthetic()
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F, deadline: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_start_populates_frame() {
        let manager = CameraManager::new(test_config());
        manager.start().unwrap();
        assert!(manager.is_active());
        assert!(wait_for(
            || manager.get_frame().is_some(),
            Duration::from_secs(2)
        ));
        manager.stop();
    }

    #[test]
    fn test_start_is_idempotent() {
        let manager = CameraManager::new(test_config());
        manager.start().unwrap();
        let count_before = manager.frame_count();
        manager.start().unwrap();
        assert!(manager.is_active());
        // Second start must not reset or re-open anything
        assert!(manager.frame_count() >= count_before);
        manager.stop();
    }

    #[test]
    fn test_fast_path_falls_back_to_cell() {
        let manager = CameraManager::new(test_config());
        manager.start().unwrap();
        assert!(wait_for(
            || manager.get_frame().is_some(),
            Duration::from_secs(2)
        ));

        // First take may come from the freshness buffer; draining it must
        // still produce a frame through the cell fallback.
        assert!(manager.get_latest_frame_fast().is_some());
        assert!(manager.get_latest_frame_fast().is_some());
        manager.stop();
    }

    #[test]
    fn test_callbacks_are_throttled_and_isolated() {
        let manager = CameraManager::new(test_config());
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        manager.add_callback(move |_frame| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        manager.add_callback(|_frame| panic!("misbehaving callback"));

        manager.start().unwrap();
        assert!(wait_for(
            || seen.load(Ordering::Relaxed) >= 3,
            Duration::from_secs(3)
        ));

        // Panicking callback must not have killed the loop
        let count = manager.frame_count();
        assert!(wait_for(
            || manager.frame_count() > count,
            Duration::from_secs(2)
        ));

        // 1-in-3 fan-out: callback invocations lag raw frames
        assert!(seen.load(Ordering::Relaxed) as u64 <= manager.frame_count() / 3 + 1);
        manager.stop();
    }

    #[test]
    fn test_remove_callback() {
        let manager = CameraManager::new(test_config());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = manager.add_callback(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        manager.remove_callback(id);

        manager.start().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        manager.stop();
        assert_eq!(seen.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stop_clears_state_and_is_reentrant() {
        let manager = CameraManager::new(test_config());
        manager.start().unwrap();
        assert!(wait_for(
            || manager.get_frame().is_some(),
            Duration::from_secs(2)
        ));

        manager.stop();
        manager.stop();

        assert!(!manager.is_active());
        assert!(manager.get_frame().is_none());
        let stats = manager.stats();
        assert_eq!(stats.frame_count, 0);
        assert!(!stats.has_frame);
    }

    #[test]
    fn test_stats_shape() {
        let manager = CameraManager::new(test_config());
        let stats = manager.stats();
        assert!(!stats.is_active);
        assert_eq!(stats.resolution, "320x240");
        assert_eq!(stats.target_fps, 60);
    }
}
