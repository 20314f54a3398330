//! FIFO Tracker Module
//!
//! Tracks insertion order for bounded-size eviction.

use std::collections::VecDeque;

// == FIFO Tracker ==
/// Insertion-order queue of `(key, generation)` pairs.
///
/// - Front = Oldest insertion
/// - Back = Newest insertion
///
/// Deletes do not touch the queue. A slot is live only while the map still
/// holds the key with the same generation, so stale slots left behind by
/// deletes, clears of single keys, or reaper sweeps are skipped on eviction
/// and dropped by [`FifoTracker::compact`].
#[derive(Debug, Default)]
pub struct FifoTracker {
    order: VecDeque<(String, u64)>,
}

impl FifoTracker {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Push ==
    /// Records a new insertion as the newest.
    pub fn push(&mut self, key: String, seq: u64) {
        self.order.push_back((key, seq));
    }

    // == Pop Oldest ==
    /// Returns and removes the oldest slot, live or stale.
    pub fn pop_oldest(&mut self) -> Option<(String, u64)> {
        self.order.pop_front()
    }

    // == Compact ==
    /// Drops every slot for which `is_live` returns false.
    pub fn compact<F>(&mut self, mut is_live: F)
    where
        F: FnMut(&str, u64) -> bool,
    {
        self.order.retain(|(key, seq)| is_live(key, *seq));
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of tracked slots, stale ones included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
