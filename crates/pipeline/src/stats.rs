//! Pipeline counters
//!
//! Monotonic for the process lifetime; written by the orchestrator and the
//! workers, read by the diagnostics endpoints.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_processed: AtomicU64,
    successful_recognitions: AtomicU64,
    failed_recognitions: AtomicU64,
    dropped_pending: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub frames_processed: u64,
    pub successful_recognitions: u64,
    pub failed_recognitions: u64,
    pub dropped_pending: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one sampled frame; returns the new total.
    pub fn record_frame(&self) -> u64 {
        self.frames_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_success(&self) {
        self.successful_recognitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_recognitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a pending item displaced from a depth-1 queue.
    pub fn record_drop(&self) {
        self.dropped_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successes(&self) -> u64 {
        self.successful_recognitions.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failed_recognitions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            successful_recognitions: self.successful_recognitions.load(Ordering::Relaxed),
            failed_recognitions: self.failed_recognitions.load(Ordering::Relaxed),
            dropped_pending: self.dropped_pending.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::new();
        assert_eq!(stats.record_frame(), 1);
        assert_eq!(stats.record_frame(), 2);
        stats.record_success();
        stats.record_failure();
        stats.record_failure();
        stats.record_drop();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_processed, 2);
        assert_eq!(snap.successful_recognitions, 1);
        assert_eq!(snap.failed_recognitions, 2);
        assert_eq!(snap.dropped_pending, 1);
    }
}
