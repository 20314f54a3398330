//! Cacher - A typed caching library with pluggable storage backends
//!
//! Values go through a [`Schema`] that serializes, optionally compresses and
//! namespaces them before handing bytes to a [`Store`]. The in-memory store
//! supports TTL expiration, FIFO eviction and lifecycle hooks; Redis,
//! memcached, SQLite and RocksDB adapters are available behind cargo features.

pub mod api;
pub mod backends;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod hooks;
pub mod models;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheStats, MemoryStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::CompressAlg;
pub use config::Config;
pub use error::{CacheError, Result};
pub use hooks::{Hook, HookPoint, Hooks};
pub use registry::{CacheProvider, CacheRegistry, CACHE_MANAGER, MEMORY};
pub use schema::{Schema, SchemaConfig};
pub use store::{CacheValue, Params, Store, StoreOptions, Ttl};
