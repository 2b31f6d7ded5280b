//! Classroom orchestrator
//!
//! `ClassroomSystem` is the single context object wiring camera, vision,
//! gate, workers, storage, and door together. Route handlers and the binary
//! hold it behind an `Arc`; nothing in the pipeline is reachable through
//! module-level state.

use crate::gate::AttendanceGate;
use crate::settings::Settings;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::worker::{
    spawn_emotion_worker, spawn_recognition_worker, InFlight, PendingEmotion, PendingRecognition,
    RecognitionHandler,
};
use crate::PipelineError;
use camera_capture::{CallbackId, CameraManager, FaceBox, VideoFrame};
use chrono::{Local, Utc};
use door_link::{AlertKind, DoorLink};
use handoff::LatestSlot;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use storage::{AttendanceRecord, EventLog, Schedule};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vision::{AttentionTracker, EmotionAnalyzer, FaceDetector, FilesystemRecognizer, Recognition, Recognizer};

/// Edge length recognition crops are resized to
const FACE_SIZE: u32 = 224;

/// Result of the web dashboard's door test action
#[derive(Debug, Clone, Serialize)]
pub struct ManualTestOutcome {
    pub success: bool,
    pub message: String,
    pub student_name: Option<String>,
    pub confidence: Option<f32>,
    pub door_opened: bool,
    pub door_connected: bool,
}

impl ManualTestOutcome {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            student_name: None,
            confidence: None,
            door_opened: false,
            door_connected: false,
        }
    }
}

/// Diagnostics snapshot of the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub is_running: bool,
    pub run_id: String,
    pub recognition_queue_len: usize,
    pub emotion_queue_len: usize,
    pub recognition_in_flight: bool,
    pub recognized_students: Vec<String>,
    pub stats: StatsSnapshot,
}

pub struct ClassroomSystem {
    settings: Settings,
    run_id: Uuid,
    camera: Arc<CameraManager>,
    detector: Arc<FaceDetector>,
    recognizer: Arc<dyn Recognizer>,
    attention: Arc<AttentionTracker>,
    analyzer: Arc<EmotionAnalyzer>,
    gate: Arc<AttendanceGate>,
    stats: Arc<PipelineStats>,
    log: Arc<EventLog>,
    schedule: Arc<Schedule>,
    door: Arc<tokio::sync::Mutex<DoorLink>>,
    recognition_queue: Arc<LatestSlot<PendingRecognition>>,
    emotion_queue: Arc<LatestSlot<PendingEmotion>>,
    in_flight: Arc<InFlight>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    frame_callback: Mutex<Option<CallbackId>>,
    door_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ClassroomSystem {
    /// Wire up every component from settings.
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        let log = Arc::new(EventLog::new(&settings.storage.logs_dir)?);
        std::fs::create_dir_all(&settings.storage.dataset_path)
            .map_err(storage::StorageError::Io)?;

        let door = if settings.door.mock {
            DoorLink::mock(Arc::clone(&log)).0
        } else {
            DoorLink::new(settings.door_config(), Arc::clone(&log))
        };

        let recognizer: Arc<dyn Recognizer> = Arc::new(FilesystemRecognizer::new(
            &settings.storage.dataset_path,
            settings.recognition.threshold,
        ));

        Ok(Self {
            run_id: Uuid::new_v4(),
            camera: Arc::new(CameraManager::new(settings.camera_config())),
            detector: Arc::new(FaceDetector::new()),
            recognizer,
            attention: Arc::new(AttentionTracker::new(settings.attention_config())),
            analyzer: Arc::new(EmotionAnalyzer::new(settings.emotion_interval())),
            gate: Arc::new(AttendanceGate::new(settings.gate_config())),
            stats: Arc::new(PipelineStats::new()),
            schedule: Arc::new(Schedule::load(&settings.storage.timetable_path)),
            door: Arc::new(tokio::sync::Mutex::new(door)),
            recognition_queue: Arc::new(LatestSlot::new()),
            emotion_queue: Arc::new(LatestSlot::new()),
            in_flight: Arc::new(InFlight::new()),
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            frame_callback: Mutex::new(None),
            door_tx: Mutex::new(None),
            log,
            settings,
        })
    }

    /// Swap the recognition backend. Must happen before `start`.
    pub fn set_recognizer(&mut self, recognizer: Arc<dyn Recognizer>) {
        self.recognizer = recognizer;
    }

    /// Swap the detector. Must happen before `start`.
    pub fn set_detector(&mut self, detector: FaceDetector) {
        self.detector = Arc::new(detector);
    }

    /// Start camera, door, workers, and frame routing.
    ///
    /// Camera failure aborts the start; a missing door does not.
    pub async fn start(&self) -> Result<(), PipelineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("System already running");
            return Ok(());
        }

        if let Err(e) = self.camera.start() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        self.connect_door().await;

        // Door requests from the recognition worker are fire-and-forget;
        // the dispatcher task serializes them onto the link.
        let (door_tx, mut door_rx) = mpsc::unbounded_channel::<String>();
        *self.door_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(door_tx.clone());
        let door = Arc::clone(&self.door);
        tokio::spawn(async move {
            while let Some(name) = door_rx.recv().await {
                door.lock().await.open_door(Some(&name), "auto_recognition").await;
            }
        });

        let worker_config = self.settings.worker_config();
        let recognition_handle = spawn_recognition_worker(
            Arc::clone(&self.recognition_queue),
            Arc::clone(&self.recognizer),
            Arc::clone(&self.in_flight),
            Arc::clone(&self.stats),
            Arc::clone(&self.running),
            worker_config.clone(),
            self.recognition_handler(door_tx),
        );
        let emotion_handle = spawn_emotion_worker(
            Arc::clone(&self.emotion_queue),
            Arc::clone(&self.analyzer),
            Arc::clone(&self.log),
            Arc::clone(&self.running),
            worker_config,
        );
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([recognition_handle, emotion_handle]);

        let callback_id = self.camera.add_callback(self.frame_processor());
        *self.frame_callback.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback_id);

        info!("Classroom system started (run {})", self.run_id);
        Ok(())
    }

    /// Stop frame routing, workers, camera, and door. Safe to call twice.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping classroom system");

        if let Some(id) = self
            .frame_callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.camera.remove_callback(id);
        }
        *self.door_tx.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let deadline = Instant::now() + Duration::from_secs(1);
            while !handle.is_finished() && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Worker did not exit in time, abandoning");
            }
        }

        self.recognition_queue.clear();
        self.emotion_queue.clear();
        self.camera.stop();
        self.door.lock().await.disconnect();

        info!("Classroom system stopped");
    }

    /// The dashboard "test door" action.
    ///
    /// Blocks the caller until the recognizer answers; unlike the automatic
    /// path, no timeout applies here. Never consults or mutates the
    /// attendance gate: every invocation attempts actuation.
    pub async fn manual_access_test(&self) -> ManualTestOutcome {
        if !self.camera.is_active() {
            return ManualTestOutcome::failure("Camera not active");
        }
        let Some(frame) = self.camera.get_frame() else {
            return ManualTestOutcome::failure("No frame available");
        };

        let faces = self.detector.detect(&frame);
        let Some(largest) = faces.iter().copied().max_by_key(FaceBox::area) else {
            return ManualTestOutcome::failure("No face detected");
        };
        let Some(crop) = frame.crop_box(&largest) else {
            return ManualTestOutcome::failure("No face detected");
        };
        let face = crop.resize(FACE_SIZE, FACE_SIZE);

        match self.recognizer.recognize(&face) {
            Ok(Recognition::Match { name, confidence }) => {
                let mut door = self.door.lock().await;
                let door_opened = door.open_door(Some(&name), "manual_test").await;
                ManualTestOutcome {
                    success: true,
                    message: format!("Access granted for {} ({:.1}%)", name, confidence),
                    student_name: Some(name),
                    confidence: Some(confidence),
                    door_opened,
                    door_connected: door.is_connected(),
                }
            }
            Ok(Recognition::Unknown) | Ok(Recognition::EmptyDatabase) => {
                let mut door = self.door.lock().await;
                if door.is_connected() {
                    door.send_alert(AlertKind::Unknown).await;
                }
                ManualTestOutcome {
                    success: true,
                    message: "Access denied - person not recognized".to_string(),
                    student_name: None,
                    confidence: None,
                    door_opened: false,
                    door_connected: door.is_connected(),
                }
            }
            Err(e) => ManualTestOutcome::failure(&format!("Recognition failed: {e}")),
        }
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            is_running: self.running.load(Ordering::SeqCst),
            run_id: self.run_id.to_string(),
            recognition_queue_len: self.recognition_queue.len(),
            emotion_queue_len: self.emotion_queue.len(),
            recognition_in_flight: self.in_flight.is_active(),
            recognized_students: self.gate.seen_names(),
            stats: self.stats.snapshot(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn camera(&self) -> &CameraManager {
        &self.camera
    }

    pub fn event_log(&self) -> Arc<EventLog> {
        Arc::clone(&self.log)
    }

    pub fn gate(&self) -> &AttendanceGate {
        &self.gate
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn door_connected(&self) -> bool {
        self.door.lock().await.is_connected()
    }

    /// Mock transport bytes, when the door runs against the mock. Test and
    /// diagnostics aid.
    pub async fn door_mock_written(&self) -> Option<Vec<u8>> {
        self.door.lock().await.mock_written()
    }

    async fn connect_door(&self) {
        let mut door = self.door.lock().await;

        if !door.connect().await {
            let fallbacks = self.settings.door.fallback_ports.clone();
            for port in fallbacks {
                info!("Probing door on {}", port);
                door.set_port(&port);
                if door.connect().await {
                    break;
                }
            }
        }

        if door.is_connected() {
            if self.settings.door.startup_test {
                if door.open_door(Some("TEST_USER"), "system_startup").await {
                    info!("Door startup test passed");
                } else {
                    warn!("Door startup test failed");
                }
            }
        } else {
            warn!("No door link available, door actions are disabled");
        }
    }

    /// The per-frame routine registered with the camera. Runs on the
    /// capture thread, so everything here stays cheap: detection happens
    /// only every Nth sampled frame, and queue inserts never block.
    fn frame_processor(&self) -> impl Fn(&VideoFrame) + Send + Sync + 'static {
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let detector = Arc::clone(&self.detector);
        let attention = Arc::clone(&self.attention);
        let gate = Arc::clone(&self.gate);
        let log = Arc::clone(&self.log);
        let queue = Arc::clone(&self.recognition_queue);
        let in_flight = Arc::clone(&self.in_flight);
        let interval = self.settings.recognition.detection_interval.max(1);

        move |frame: &VideoFrame| {
            if !running.load(Ordering::SeqCst) {
                return;
            }

            let count = stats.record_frame();
            if interval > 1 && count % interval != 1 {
                return;
            }

            let faces = detector.detect(frame);
            if faces.is_empty() {
                return;
            }

            // Attention runs inline; tracks are labeled with a recognized
            // identity when one exists, else a positional placeholder.
            let pairs: Vec<(FaceBox, String)> = faces
                .iter()
                .enumerate()
                .map(|(i, face)| {
                    let name = gate
                        .first_recognized()
                        .unwrap_or_else(|| format!("face-{i}"));
                    (*face, name)
                })
                .collect();
            for sample in attention.update(&pairs) {
                log.log_attention(&sample);
            }

            // Recognition hand-off, skipped while the worker is busy
            if in_flight.is_active() || !queue.is_empty() {
                debug!("Recognition busy, frame {} not enqueued", frame.sequence);
                return;
            }

            let Some(largest) = faces.iter().copied().max_by_key(FaceBox::area) else {
                return;
            };
            let Some(crop) = frame.crop_box(&largest) else {
                return;
            };
            let displaced = queue.publish(PendingRecognition {
                face: crop.resize(FACE_SIZE, FACE_SIZE),
                bbox: largest,
                frame_sequence: frame.sequence,
            });
            if displaced.is_some() {
                stats.record_drop();
            }
        }
    }

    /// Handles a successful recognition on the worker thread: gate decision,
    /// attendance + timetable, emotion hand-off, optional door request.
    fn recognition_handler(&self, door_tx: mpsc::UnboundedSender<String>) -> RecognitionHandler {
        let gate = Arc::clone(&self.gate);
        let log = Arc::clone(&self.log);
        let schedule = Arc::clone(&self.schedule);
        let emotion_queue = Arc::clone(&self.emotion_queue);
        let stats = Arc::clone(&self.stats);

        Arc::new(move |name: &str, _confidence: f32, face: VideoFrame| {
            let decision = gate.decide(name);

            if decision.record_attendance {
                let (course, classroom) = match schedule.current_class(name, Local::now()) {
                    Some((course, room)) => (Some(course), Some(room)),
                    None => (None, None),
                };
                log.log_attendance(&AttendanceRecord {
                    student_name: name.to_string(),
                    timestamp: Utc::now(),
                    has_class: course.is_some(),
                    course,
                    classroom,
                });
            }

            if decision.queue_emotion {
                let frame_sequence = face.sequence;
                let displaced = emotion_queue.publish(PendingEmotion {
                    face,
                    student_name: name.to_string(),
                    frame_sequence,
                });
                if displaced.is_some() {
                    stats.record_drop();
                }
            }

            if decision.open_door {
                let _ = door_tx.send(name.to_string());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::path::Path;
    use storage::LogKind;
    use vision::{DetectorConfig, VisionError};

    struct StubRecognizer {
        result: Recognition,
    }

    impl Recognizer for StubRecognizer {
        fn recognize(&self, _face: &VideoFrame) -> Result<Recognition, VisionError> {
            Ok(self.result.clone())
        }
    }

    fn alice_stub() -> Arc<dyn Recognizer> {
        Arc::new(StubRecognizer {
            result: Recognition::Match {
                name: "Alice".to_string(),
                confidence: 82.0,
            },
        })
    }

    fn test_settings(root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.camera.synthetic = true;
        settings.camera.stream_width = 320;
        settings.camera.stream_height = 240;
        settings.camera.target_fps = 60;
        settings.recognition.detection_interval = 1;
        settings.recognition.poll_ms = 20;
        settings.recognition.timeout_ms = 500;
        settings.emotion.poll_ms = 20;
        settings.emotion.interval_secs = 0;
        settings.door.mock = true;
        settings.door.startup_test = false;
        settings.storage.logs_dir = root.join("logs").to_string_lossy().into_owned();
        settings.storage.dataset_path = root.join("dataset").to_string_lossy().into_owned();
        settings.storage.timetable_path = root.join("timetable.csv").to_string_lossy().into_owned();
        settings
    }

    async fn wait_until<F: Fn() -> bool>(cond: F, deadline: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_attendance_recorded_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        system.set_recognizer(alice_stub());
        system.start().await.unwrap();

        let stats = Arc::clone(&system.stats);
        assert!(
            wait_until(|| stats.successes() >= 3, Duration::from_secs(5)).await,
            "expected repeated recognitions of the same identity"
        );

        let log = system.event_log();
        assert_eq!(log.count(LogKind::Attendance), 1);
        assert_eq!(system.gate().seen_names(), vec!["Alice"]);

        system.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_emotion_logged_on_first_sighting() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        system.set_recognizer(alice_stub());
        system.start().await.unwrap();

        let log = system.event_log();
        assert!(
            wait_until(|| log.count(LogKind::Emotions) >= 1, Duration::from_secs(5)).await
        );
        assert_eq!(log.recent(LogKind::Emotions, 1)[0]["student_name"], "Alice");

        system.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_manual_test_grants_access_and_opens_door() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        system.set_recognizer(alice_stub());
        system.start().await.unwrap();

        let camera = system.camera();
        assert!(wait_until(|| camera.get_frame().is_some(), Duration::from_secs(2)).await);

        let outcome = system.manual_access_test().await;
        assert!(outcome.success, "message: {}", outcome.message);
        assert_eq!(outcome.student_name.as_deref(), Some("Alice"));
        assert_eq!(outcome.confidence, Some(82.0));
        assert!(outcome.door_opened);
        assert!(outcome.door_connected);

        let written = system.door_mock_written().await.unwrap();
        assert!(written.windows(8).any(|w| w == b"MOVE\nOK\n"));

        system.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_manual_test_without_face() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        system.set_recognizer(alice_stub());
        // A detector that can never fire simulates an empty classroom
        system.set_detector(FaceDetector::with_config(DetectorConfig {
            std_threshold: f32::MAX,
            ..DetectorConfig::default()
        }));
        system.start().await.unwrap();

        let camera = system.camera();
        assert!(wait_until(|| camera.get_frame().is_some(), Duration::from_secs(2)).await);

        let outcome = system.manual_access_test().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "No face detected");
        assert!(!outcome.door_opened);

        system.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_manual_test_requires_active_camera() {
        let dir = tempfile::tempdir().unwrap();
        let system = ClassroomSystem::new(test_settings(dir.path())).unwrap();

        let outcome = system.manual_access_test().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Camera not active");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_manual_test_alerts_on_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        system.set_recognizer(Arc::new(StubRecognizer {
            result: Recognition::Unknown,
        }));
        system.start().await.unwrap();

        let camera = system.camera();
        assert!(wait_until(|| camera.get_frame().is_some(), Duration::from_secs(2)).await);

        let outcome = system.manual_access_test().await;
        assert!(outcome.success);
        assert!(outcome.student_name.is_none());
        assert!(!outcome.door_opened);

        let written = system.door_mock_written().await.unwrap();
        assert!(written.windows(8).any(|w| w == b"INCONNU\n"));

        system.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_auto_open_door_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path());
        settings.gate.auto_open_door = true;
        let mut system = ClassroomSystem::new(settings).unwrap();
        system.set_recognizer(alice_stub());
        system.start().await.unwrap();

        let door = Arc::clone(&system.door);
        assert!(
            wait_until(
                || {
                    door.try_lock()
                        .ok()
                        .and_then(|d| d.mock_written())
                        .map_or(false, |w| w.windows(8).any(|win| win == b"MOVE\nOK\n"))
                },
                Duration::from_secs(5)
            )
            .await
        );

        system.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        system.set_recognizer(alice_stub());

        system.start().await.unwrap();
        system.start().await.unwrap();
        assert!(system.is_running());

        system.stop().await;
        system.stop().await;
        assert!(!system.is_running());
        assert!(!system.camera().is_active());
        assert_eq!(system.status().recognition_queue_len, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let system = ClassroomSystem::new(test_settings(dir.path())).unwrap();
        let status = system.status();
        assert!(!status.is_running);
        assert!(!status.recognition_in_flight);
        assert_eq!(status.stats.successful_recognitions, 0);
        assert!(!status.run_id.is_empty());
    }
}
