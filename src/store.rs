//! Store Contract
//!
//! The polymorphic interface every backend implements, plus the option types
//! shared by all of them.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::clock::saturating_millis;
use crate::codec::CompressAlg;
use crate::error::Result;
use crate::hooks::{HookPoint, Hooks};

// == Cache Value ==
/// Bound for anything a store can hold.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

// == TTL ==
/// Time-to-live for an entry.
///
/// `Default` defers to the store's configured default. A store whose own
/// default is `Default` keeps entries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    #[default]
    Default,
    Never,
    After(Duration),
}

impl Ttl {
    /// Whole seconds; zero means never expire.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Ttl::Never
        } else {
            Ttl::After(Duration::from_secs(secs))
        }
    }

    /// Resolves `Default` against a fallback.
    pub fn or(self, fallback: Ttl) -> Ttl {
        match self {
            Ttl::Default => fallback,
            other => other,
        }
    }

    /// Absolute expiry in unix milliseconds, `None` for entries that never expire.
    pub fn expires_at(self, now_ms: u64) -> Option<u64> {
        match self {
            Ttl::After(ttl) => Some(now_ms.saturating_add(saturating_millis(ttl))),
            Ttl::Default | Ttl::Never => None,
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

// == Store Options ==
/// Configuration bundle applied to a store.
pub struct StoreOptions<M> {
    /// Default TTL for writes that pass `Ttl::Default`
    pub ttl: Ttl,
    /// Compression applied to stored values
    pub compress_alg: CompressAlg,
    /// Maximum number of entries, 0 = unbounded (memory store only)
    pub max_items: usize,
    /// Lifecycle hooks
    pub hooks: Hooks<M>,
}

impl<M> StoreOptions<M> {
    pub fn new() -> Self {
        Self {
            ttl: Ttl::Default,
            compress_alg: CompressAlg::None,
            max_items: 0,
            hooks: Hooks::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn with_compression(mut self, alg: CompressAlg) -> Self {
        self.compress_alg = alg;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks<M>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_hook<F>(mut self, point: HookPoint, callback: F) -> Self
    where
        F: Fn(&str, Option<&M>) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.with(point, callback);
        self
    }
}

impl<M> Default for StoreOptions<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for StoreOptions<M> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            compress_alg: self.compress_alg,
            max_items: self.max_items,
            hooks: self.hooks.clone(),
        }
    }
}

impl<M> std::fmt::Debug for StoreOptions<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("ttl", &self.ttl)
            .field("compress_alg", &self.compress_alg)
            .field("max_items", &self.max_items)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

// == Params ==
/// One item of a batch write, with its own TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct Params<M> {
    pub key: String,
    pub value: M,
    pub ttl: Ttl,
}

impl<M> Params<M> {
    pub fn new(key: impl Into<String>, value: M) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: Ttl::Default,
        }
    }

    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }
}

// == Store Trait ==
/// Key-value persistence with TTL support.
///
/// Implementations fire their own hooks around get/set/delete and report
/// missing or expired keys as `CacheError::NotFound`.
#[async_trait]
pub trait Store<M>: Send + Sync
where
    M: Send + Sync + 'static,
{
    /// Short backend name for logs, e.g. "memory" or "redis".
    fn name(&self) -> &'static str;

    /// Replaces the store's options.
    async fn set_options(&self, options: StoreOptions<M>);

    /// Returns the registered hooks.
    async fn hooks(&self) -> Hooks<M>;

    async fn get(&self, key: &str) -> Result<M>;

    /// Returns the values found, in key order, skipping misses.
    /// Fails with NotFound only when none of the keys resolve.
    ///
    /// Stores also skip entries that fail to decode, logging them at `warn`.
    /// [`Schema::mget`](crate::schema::Schema::mget) instead propagates decode
    /// errors, since it decodes above the store.
    async fn mget(&self, keys: &[&str]) -> Result<Vec<M>>;

    async fn set(&self, key: &str, value: M, ttl: Ttl) -> Result<()>;

    async fn mset(&self, items: Vec<Params<M>>) -> Result<()>;

    /// Removes a key. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;

    /// Removes every entry whose key starts with `prefix`.
    async fn clear_prefix(&self, prefix: &str) -> Result<()>;
}
