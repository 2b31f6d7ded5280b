//! Depth-1 Hand-Off Slot
//!
//! Bounded exchange cell between a producer loop and a slower consumer:
//! the slot holds at most one item, a new publish displaces the unconsumed
//! one, and consumers can poll with a timeout.

mod slot;

pub use slot::LatestSlot;
