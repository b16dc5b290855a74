//! Identifiers for the two sides of a dependency edge.
//!
//! A *source* is anything that can be read and can change: a signal or a
//! memo. A *subscriber* is a computation that reads sources: a memo or an
//! effect. Memos are both.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a readable source (signal or memo).
pub type SourceId = u64;

/// Allocate a new source ID.
///
/// Signals and memos share one counter so their IDs never collide in the
/// runtime's edge maps.
pub(crate) fn next_source_id() -> SourceId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo or effect) gets a unique ID when created. This ID is
/// used to track dependencies and avoid duplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}
