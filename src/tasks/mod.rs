//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of a store.
//!
//! # Tasks
//! - Reaper: Removes expired entries at a fixed interval until shut down

mod reaper;

pub use reaper::{spawn_reaper, Reap};
