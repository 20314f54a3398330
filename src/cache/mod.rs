//! Cache Module
//!
//! In-process memory store with TTL expiration and FIFO eviction.

mod entry;
mod fifo;
mod stats;
mod store;


// Re-export public types
pub use entry::{Entry, Payload};
pub use fifo::FifoTracker;
pub use stats::{CacheStats, StatsCounter};
pub use store::{MemoryStore, DEFAULT_REAP_INTERVAL};
