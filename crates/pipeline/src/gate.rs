//! Attendance gate
//!
//! Decides what a recognition event triggers. Deduplication is scoped to
//! the process run: a restart forgets who was seen. The first sighting of
//! an identity records attendance and queues an emotion capture; repeats do
//! neither. Door actuation from the automatic pipeline is config-gated and
//! off by default.

use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

/// Gate configuration
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    /// Actuate the door on an identity's first sighting
    pub auto_open_door: bool,
}

/// What a recognition event should trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    /// First time this identity was seen this run
    pub first_sighting: bool,
    pub record_attendance: bool,
    pub queue_emotion: bool,
    pub open_door: bool,
}

pub struct AttendanceGate {
    config: GateConfig,
    seen: Mutex<HashSet<String>>,
}

impl AttendanceGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Test-and-set for an identity.
    ///
    /// Atomic under the gate's lock, so concurrent callers cannot both see
    /// `first_sighting` for the same name.
    pub fn decide(&self, name: &str) -> GateDecision {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let first_sighting = seen.insert(name.to_string());

        if first_sighting {
            info!("First sighting of {} this run", name);
        } else {
            debug!("{} already recognized, suppressing repeat triggers", name);
        }

        GateDecision {
            first_sighting,
            record_attendance: first_sighting,
            queue_emotion: first_sighting,
            open_door: first_sighting && self.config.auto_open_door,
        }
    }

    pub fn is_seen(&self, name: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// All identities credited this run, sorted.
    pub fn seen_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Any one recognized identity, used to label attention tracks.
    pub fn first_recognized(&self) -> Option<String> {
        self.seen_names().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_triggers_everything() {
        let gate = AttendanceGate::new(GateConfig {
            auto_open_door: true,
        });

        let decision = gate.decide("alice");
        assert!(decision.first_sighting);
        assert!(decision.record_attendance);
        assert!(decision.queue_emotion);
        assert!(decision.open_door);
    }

    #[test]
    fn test_repeat_sighting_suppressed() {
        let gate = AttendanceGate::new(GateConfig {
            auto_open_door: true,
        });

        gate.decide("alice");
        let repeat = gate.decide("alice");
        assert!(!repeat.first_sighting);
        assert!(!repeat.record_attendance);
        assert!(!repeat.queue_emotion);
        assert!(!repeat.open_door);
    }

    #[test]
    fn test_door_gated_by_config() {
        let gate = AttendanceGate::new(GateConfig::default());
        let decision = gate.decide("alice");
        assert!(decision.record_attendance);
        assert!(!decision.open_door);
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = AttendanceGate::new(GateConfig::default());
        assert!(gate.decide("alice").first_sighting);
        assert!(gate.decide("bob").first_sighting);
        assert_eq!(gate.seen_count(), 2);
        assert_eq!(gate.seen_names(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_at_most_once_over_many_sightings() {
        let gate = AttendanceGate::new(GateConfig::default());
        let recorded = (0..25)
            .map(|_| gate.decide("alice"))
            .filter(|d| d.record_attendance)
            .count();
        assert_eq!(recorded, 1);
        assert_eq!(gate.seen_count(), 1);
    }
}
