//! Latest-Item Slot Implementation

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Depth-1 hand-off slot with a drain-before-insert discipline.
///
/// The producer side never blocks: `publish` replaces whatever is pending
/// and hands the displaced item back so callers can count drops. Consumers
/// take non-blocking or with a bounded wait. Under sustained overload the
/// oldest unconsumed item is discarded, never the newest.
pub struct LatestSlot<T> {
    cell: Mutex<Option<T>>,
    available: Condvar,
}

impl<T> LatestSlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
            available: Condvar::new(),
        }
    }

    /// Insert an item, displacing any unconsumed one.
    ///
    /// Returns the displaced item so the producer can account for the drop.
    pub fn publish(&self, item: T) -> Option<T> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        let displaced = cell.replace(item);
        self.available.notify_one();
        displaced
    }

    /// Take the pending item without waiting.
    pub fn try_take(&self) -> Option<T> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        cell.take()
    }

    /// Wait up to `timeout` for an item.
    ///
    /// Returns `None` on timeout. Consumers use the timeout as their idle
    /// tick, so it doubles as the cadence for watchdog checks.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if cell.is_none() {
            let (guard, _timed_out) = self
                .available
                .wait_timeout_while(cell, timeout, |c| c.is_none())
                .unwrap_or_else(|e| e.into_inner());
            cell = guard;
        }
        cell.take()
    }

    /// Whether an item is pending.
    pub fn is_empty(&self) -> bool {
        self.cell
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Number of pending items (0 or 1), for diagnostics.
    pub fn len(&self) -> usize {
        usize::from(!self.is_empty())
    }

    /// Drop any pending item.
    pub fn clear(&self) {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        *cell = None;
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_publish_and_take() {
        let slot = LatestSlot::new();
        assert!(slot.publish(1).is_none());
        assert_eq!(slot.try_take(), Some(1));
        assert_eq!(slot.try_take(), None);
    }

    #[test]
    fn test_second_publish_displaces_first() {
        let slot = LatestSlot::new();
        assert!(slot.publish(1).is_none());
        assert_eq!(slot.publish(2), Some(1));
        assert_eq!(slot.try_take(), Some(2));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_take_timeout_expires_when_empty() {
        let slot: LatestSlot<u32> = LatestSlot::new();
        let start = Instant::now();
        assert_eq!(slot.take_timeout(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_take_timeout_wakes_on_publish() {
        let slot = Arc::new(LatestSlot::new());
        let producer = Arc::clone(&slot);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.publish(7u32);
        });

        assert_eq!(slot.take_timeout(Duration::from_secs(2)), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn test_clear_discards_pending() {
        let slot = LatestSlot::new();
        slot.publish("stale");
        slot.clear();
        assert!(slot.is_empty());
        assert_eq!(slot.len(), 0);
    }

    proptest! {
        // For any publish sequence with no consumption in between, the slot
        // holds exactly the newest item and every displaced item is an older
        // publish, in order.
        #[test]
        fn prop_only_newest_survives(items in prop::collection::vec(any::<u32>(), 1..50)) {
            let slot = LatestSlot::new();
            let mut displaced = Vec::new();

            for &item in &items {
                if let Some(old) = slot.publish(item) {
                    displaced.push(old);
                }
                prop_assert_eq!(slot.len(), 1);
            }

            prop_assert_eq!(slot.try_take(), Some(*items.last().unwrap()));
            prop_assert_eq!(displaced, items[..items.len() - 1].to_vec());
        }

        // Interleaved takes never observe more than one buffered item.
        #[test]
        fn prop_depth_never_exceeds_one(ops in prop::collection::vec(any::<bool>(), 1..100)) {
            let slot = LatestSlot::new();
            let mut seq = 0u32;

            for is_publish in ops {
                if is_publish {
                    seq += 1;
                    slot.publish(seq);
                } else {
                    slot.try_take();
                }
                prop_assert!(slot.len() <= 1);
            }
        }
    }
}
