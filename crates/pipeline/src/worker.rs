//! Background workers
//!
//! One recognition worker and one emotion worker, each draining a depth-1
//! queue. The recognition call runs on an inner thread under a wall-clock
//! timeout because its latency is unbounded; a timed-out call is abandoned,
//! not killed, and the leaked computation ends whenever the backend does.

use crate::stats::PipelineStats;
use camera_capture::{FaceBox, VideoFrame};
use chrono::Utc;
use handoff::LatestSlot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use storage::{EmotionRecord, EventLog};
use tracing::{debug, info, warn};
use vision::{EmotionAnalyzer, Recognition, Recognizer};

/// Worker timing knobs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue poll timeout; also the watchdog check cadence
    pub poll_interval: Duration,
    /// Wall-clock budget for one recognition call
    pub recognition_timeout: Duration,
    /// Hard ceiling after which a stuck in-flight marker is force-cleared
    pub watchdog_ceiling: Duration,
    /// Emotion queue poll timeout
    pub emotion_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            recognition_timeout: Duration::from_secs(3),
            watchdog_ceiling: Duration::from_secs(8),
            emotion_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Work item for the recognition queue
#[derive(Debug, Clone)]
pub struct PendingRecognition {
    /// Face crop, already resized for the recognizer
    pub face: VideoFrame,
    pub bbox: FaceBox,
    pub frame_sequence: u64,
}

/// Work item for the emotion queue
#[derive(Debug, Clone)]
pub struct PendingEmotion {
    pub face: VideoFrame,
    pub student_name: String,
    pub frame_sequence: u64,
}

/// Outcome of one recognition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Success { name: String, confidence: f32 },
    Unrecognized,
    EmptyDatabase,
    Error(String),
    TimedOut,
}

/// Timestamped in-flight marker shared between the recognition worker and
/// the orchestrator (which skips enqueueing while a call is in flight).
#[derive(Debug, Default)]
pub struct InFlight {
    started: Mutex<Option<Instant>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|at| at.elapsed())
    }

    /// Mark a call in flight. The marker clears when the guard drops, so no
    /// exit path can leak it.
    pub(crate) fn begin(&self) -> InFlightGuard<'_> {
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        InFlightGuard(self)
    }

    fn clear(&self) {
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

pub(crate) struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Handler invoked on a successful recognition with a real identity.
pub type RecognitionHandler = Arc<dyn Fn(&str, f32, VideoFrame) + Send + Sync>;

/// Spawn the recognition worker thread.
///
/// State machine: Idle -> Dispatched -> (Succeeded | Failed | TimedOut) -> Idle.
pub fn spawn_recognition_worker(
    queue: Arc<LatestSlot<PendingRecognition>>,
    recognizer: Arc<dyn Recognizer>,
    in_flight: Arc<InFlight>,
    stats: Arc<PipelineStats>,
    running: Arc<AtomicBool>,
    config: WorkerConfig,
    on_recognized: RecognitionHandler,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("recognition-worker".into())
        .spawn(move || {
            info!("Recognition worker started");

            while running.load(Ordering::SeqCst) {
                match queue.take_timeout(config.poll_interval) {
                    Some(pending) => {
                        let guard = in_flight.begin();
                        let outcome = recognize_with_timeout(
                            Arc::clone(&recognizer),
                            pending.face.clone(),
                            config.recognition_timeout,
                        );

                        match &outcome {
                            RecognitionOutcome::Success { name, confidence } => {
                                stats.record_success();
                                info!(
                                    "Recognized {} at {:.1}% (frame {})",
                                    name, confidence, pending.frame_sequence
                                );
                                on_recognized(name, *confidence, pending.face);
                            }
                            RecognitionOutcome::TimedOut => {
                                stats.record_failure();
                                warn!(
                                    "Recognition timed out after {:?}, abandoning call",
                                    config.recognition_timeout
                                );
                            }
                            RecognitionOutcome::Error(message) => {
                                stats.record_failure();
                                warn!("Recognition backend error: {}", message);
                            }
                            RecognitionOutcome::Unrecognized
                            | RecognitionOutcome::EmptyDatabase => {
                                stats.record_failure();
                                debug!("Recognition attempt produced no identity");
                            }
                        }
                        drop(guard);
                    }
                    None => {
                        // Watchdog: an in-flight marker older than the
                        // ceiling means the completion signal never came.
                        if let Some(elapsed) = in_flight.elapsed() {
                            if elapsed > config.watchdog_ceiling {
                                warn!(
                                    "Recognition stuck for {:.1}s, forcing idle",
                                    elapsed.as_secs_f32()
                                );
                                in_flight.clear();
                                stats.record_failure();
                            }
                        }
                    }
                }
            }

            info!("Recognition worker stopped");
        })
        .expect("failed to spawn recognition worker")
}

/// Run one recognition call on an inner thread with a wall-clock timeout.
fn recognize_with_timeout(
    recognizer: Arc<dyn Recognizer>,
    face: VideoFrame,
    timeout: Duration,
) -> RecognitionOutcome {
    let (tx, rx) = mpsc::channel();

    let spawned = std::thread::Builder::new()
        .name("recognition-call".into())
        .spawn(move || {
            let result = recognizer.recognize(&face);
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return RecognitionOutcome::Error(format!("failed to dispatch: {e}"));
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(Recognition::Match { name, confidence })) => {
            RecognitionOutcome::Success { name, confidence }
        }
        Ok(Ok(Recognition::Unknown)) => RecognitionOutcome::Unrecognized,
        Ok(Ok(Recognition::EmptyDatabase)) => RecognitionOutcome::EmptyDatabase,
        Ok(Err(e)) => RecognitionOutcome::Error(e.to_string()),
        Err(mpsc::RecvTimeoutError::Timeout) => RecognitionOutcome::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            RecognitionOutcome::Error("recognition call thread died".to_string())
        }
    }
}

/// Spawn the emotion worker thread.
///
/// Simpler than recognition: the analyzer is a fast heuristic, so no
/// timeout discipline applies here.
pub fn spawn_emotion_worker(
    queue: Arc<LatestSlot<PendingEmotion>>,
    analyzer: Arc<EmotionAnalyzer>,
    log: Arc<EventLog>,
    running: Arc<AtomicBool>,
    config: WorkerConfig,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("emotion-worker".into())
        .spawn(move || {
            info!("Emotion worker started");

            while running.load(Ordering::SeqCst) {
                if let Some(pending) = queue.take_timeout(config.emotion_poll_interval) {
                    if let Some(score) = analyzer.analyze(&pending.face, &pending.student_name) {
                        log.log_emotion(&EmotionRecord {
                            student_name: pending.student_name,
                            timestamp: Utc::now(),
                            emotion: score.emotion,
                            confidence: score.confidence,
                        });
                    }
                }
            }

            info!("Emotion worker stopped");
        })
        .expect("failed to spawn emotion worker")
}
