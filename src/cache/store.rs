//! Cache Store Module
//!
//! In-process memory store: a map behind one reader/writer lock, TTL expiry,
//! optional FIFO bound on item count, and a background reaper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use crate::cache::{CacheStats, Entry, FifoTracker, Payload, StatsCounter};
use crate::clock::{Clock, SystemClock};
use crate::codec::{self, CompressAlg};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::hooks::{HookPoint, Hooks};
use crate::store::{CacheValue, Params, Store, StoreOptions, Ttl};
use crate::tasks::{spawn_reaper, Reap};

/// Interval between reaper sweeps unless configured otherwise.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(1);

// == Map State ==
/// Everything guarded by the data lock.
#[derive(Debug)]
struct MapState<M> {
    entries: HashMap<String, Entry<M>>,
    order: FifoTracker,
    next_seq: u64,
}

impl<M> MapState<M> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: FifoTracker::new(),
            next_seq: 0,
        }
    }

    // == Insert ==
    /// Inserts or overwrites `key`, returning how many entries were evicted.
    ///
    /// Overwrites keep their place in the insertion order. New keys evict
    /// the oldest tracked entries until there is room under `max_items`.
    fn insert(
        &mut self,
        key: String,
        payload: Payload<M>,
        expires_at: Option<u64>,
        max_items: usize,
    ) -> usize {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.payload = payload;
            entry.expires_at = expires_at;
            return 0;
        }

        let evicted = if max_items > 0 {
            self.evict_to(max_items - 1)
        } else {
            0
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push(key.clone(), seq);
        self.entries.insert(key, Entry::new(payload, expires_at, seq));
        self.compact_order();
        evicted
    }

    // == Evict ==
    /// Pops the oldest live entries until at most `limit` remain.
    fn evict_to(&mut self, limit: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > limit {
            let Some((key, seq)) = self.order.pop_oldest() else {
                break;
            };
            if self.is_live(&key, seq) {
                self.entries.remove(&key);
                debug!("Evicted oldest key '{}'", key);
                evicted += 1;
            }
        }
        evicted
    }

    fn is_live(&self, key: &str, seq: u64) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.seq == seq)
    }

    /// Drops stale order slots once they outnumber live entries.
    fn compact_order(&mut self) {
        if self.order.len() > self.entries.len() * 2 + 16 {
            let entries = &self.entries;
            self.order
                .compact(|key, seq| entries.get(key).is_some_and(|entry| entry.seq == seq));
        }
    }

    fn clear(&mut self) {
        self.entries = HashMap::new();
        self.order.clear();
    }
}

// == Shared State ==
/// State shared between store handles and the reaper.
struct Shared<M> {
    data: RwLock<MapState<M>>,
    options: RwLock<StoreOptions<M>>,
    clock: Arc<dyn Clock>,
    stats: StatsCounter,
}

impl<M: CacheValue> Shared<M> {
    /// Two-phase sweep: collect under the read lock, delete under the write lock.
    ///
    /// Each candidate is re-checked at delete time so a key refreshed by a
    /// concurrent `set` between the two phases survives.
    async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();

        let expired: Vec<(String, u64)> = {
            let data = self.data.read().await;
            data.entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, entry)| (key.clone(), entry.seq))
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut data = self.data.write().await;
        let mut removed = 0;
        for (key, seq) in expired {
            let still_expired = data
                .entries
                .get(&key)
                .is_some_and(|entry| entry.seq == seq && entry.is_expired(now));
            if still_expired {
                data.entries.remove(&key);
                removed += 1;
            }
        }
        data.compact_order();
        drop(data);

        self.stats.record_expirations(removed);
        removed
    }

    fn encode(&self, value: &M, alg: CompressAlg) -> Result<Payload<M>> {
        if alg.is_enabled() {
            Ok(Payload::Compressed {
                alg,
                bytes: codec::encode(value, alg)?,
            })
        } else {
            Ok(Payload::Plain(value.clone()))
        }
    }

    fn decode(payload: Payload<M>) -> Result<M> {
        match payload {
            Payload::Plain(value) => Ok(value),
            Payload::Compressed { alg, bytes } => codec::decode(&bytes, alg),
        }
    }
}

#[async_trait]
impl<M: CacheValue> Reap for Shared<M> {
    fn label(&self) -> &'static str {
        "memory"
    }

    async fn reap(&self) -> usize {
        self.purge_expired().await
    }
}

// == Memory Store ==
/// Thread-safe, expiring, optionally bounded in-process store.
///
/// Each store owns one background reaper that runs until [`MemoryStore::close`]
/// is called or the store is dropped. Share a store between tasks or facades
/// by wrapping it in an `Arc`.
pub struct MemoryStore<M> {
    shared: Arc<Shared<M>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<M: CacheValue> MemoryStore<M> {
    // == Constructor ==
    /// Creates a store on the system clock with a one second reaper interval.
    ///
    /// # Errors
    /// Returns `CacheError::Configuration` when called outside a Tokio runtime,
    /// which the reaper needs.
    pub fn new(options: StoreOptions<M>) -> Result<Self> {
        Self::with_clock(options, Arc::new(SystemClock), DEFAULT_REAP_INTERVAL)
    }

    /// Creates a store with an explicit clock and reaper interval.
    pub fn with_clock(
        options: StoreOptions<M>,
        clock: Arc<dyn Clock>,
        reap_interval: Duration,
    ) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CacheError::Configuration(
                "MemoryStore requires a Tokio runtime for its reaper".to_string(),
            ));
        }
        if reap_interval.is_zero() {
            return Err(CacheError::Configuration(
                "reap interval must be greater than zero".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            data: RwLock::new(MapState::new()),
            options: RwLock::new(options),
            clock,
            stats: StatsCounter::new(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_reaper(Arc::downgrade(&shared), reap_interval, shutdown_rx);

        Ok(Self {
            shared,
            shutdown_tx,
        })
    }

    /// Creates a store from environment-derived configuration.
    ///
    /// An unrecognized compression identifier yields no store.
    pub fn from_config(config: &Config) -> Result<Self> {
        let options = StoreOptions::new()
            .with_ttl(config.default_ttl())
            .with_compression(config.compress_alg()?)
            .with_max_items(config.max_items);
        Self::with_clock(options, Arc::new(SystemClock), config.reap_interval())
    }

    // == Close ==
    /// Stops the background reaper. Entries stay readable; expiry is still
    /// enforced on access.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    // == Purge Expired ==
    /// Runs one reaper sweep immediately, returning the number removed.
    pub async fn purge_expired(&self) -> usize {
        self.shared.purge_expired().await
    }

    // == Length ==
    /// Number of physically present entries, including expired ones the
    /// reaper has not swept yet.
    pub async fn len(&self) -> usize {
        self.shared.data.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let total = self.len().await;
        self.shared.stats.snapshot(total)
    }

    /// Snapshot of the settings needed outside the data lock.
    async fn settings(&self) -> (Ttl, CompressAlg, usize, Hooks<M>) {
        let options = self.shared.options.read().await;
        (
            options.ttl,
            options.compress_alg,
            options.max_items,
            options.hooks.clone(),
        )
    }
}

impl<M> Drop for MemoryStore<M> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl<M> std::fmt::Debug for MemoryStore<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("closed", &*self.shutdown_tx.borrow())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: CacheValue> Store<M> for MemoryStore<M> {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set_options(&self, options: StoreOptions<M>) {
        let max_items = options.max_items;
        *self.shared.options.write().await = options;

        if max_items > 0 {
            let evicted = self.shared.data.write().await.evict_to(max_items);
            self.shared.stats.record_evictions(evicted);
        }
    }

    async fn hooks(&self) -> Hooks<M> {
        self.shared.options.read().await.hooks.clone()
    }

    // == Get ==
    async fn get(&self, key: &str) -> Result<M> {
        let (_, _, _, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeGet, key, None);

        let now = self.shared.clock.now_ms();
        let payload = {
            let data = self.shared.data.read().await;
            data.entries
                .get(key)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.payload.clone())
        };

        let Some(payload) = payload else {
            self.shared.stats.record_miss();
            return Err(CacheError::NotFound(key.to_string()));
        };
        self.shared.stats.record_hit();

        let value = Shared::decode(payload)?;
        hooks.fire(HookPoint::AfterGet, key, Some(&value));
        Ok(value)
    }

    // == MGet ==
    async fn mget(&self, keys: &[&str]) -> Result<Vec<M>> {
        let now = self.shared.clock.now_ms();
        let payloads: Vec<(&str, Payload<M>)> = {
            let data = self.shared.data.read().await;
            keys.iter()
                .filter_map(|key| data.entries.get(*key).map(|entry| (*key, entry)))
                .filter(|(_, entry)| !entry.is_expired(now))
                .map(|(key, entry)| (key, entry.payload.clone()))
                .collect()
        };

        let values: Vec<M> = payloads
            .into_iter()
            .filter_map(|(key, payload)| match Shared::decode(payload) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Skipping undecodable entry '{}' in mget: {}", key, err);
                    None
                }
            })
            .collect();

        if values.is_empty() {
            return Err(CacheError::NotFound(keys.join(",")));
        }
        Ok(values)
    }

    // == Set ==
    async fn set(&self, key: &str, value: M, ttl: Ttl) -> Result<()> {
        let (default_ttl, alg, max_items, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeSet, key, Some(&value));

        let expires_at = ttl.or(default_ttl).expires_at(self.shared.clock.now_ms());
        let payload = self.shared.encode(&value, alg)?;

        let evicted = self
            .shared
            .data
            .write()
            .await
            .insert(key.to_string(), payload, expires_at, max_items);
        self.shared.stats.record_evictions(evicted);

        hooks.fire(HookPoint::AfterSet, key, Some(&value));
        Ok(())
    }

    // == MSet ==
    /// All items become visible under one write lock. An encode failure on
    /// any item aborts the batch before anything is written.
    async fn mset(&self, items: Vec<Params<M>>) -> Result<()> {
        let (default_ttl, alg, max_items, hooks) = self.settings().await;
        let now = self.shared.clock.now_ms();

        let mut prepared = Vec::with_capacity(items.len());
        for item in &items {
            hooks.fire(HookPoint::BeforeSet, &item.key, Some(&item.value));
            let expires_at = item.ttl.or(default_ttl).expires_at(now);
            let payload = self.shared.encode(&item.value, alg)?;
            prepared.push((item.key.clone(), payload, expires_at));
        }

        let evicted = {
            let mut data = self.shared.data.write().await;
            prepared
                .into_iter()
                .map(|(key, payload, expires_at)| data.insert(key, payload, expires_at, max_items))
                .sum::<usize>()
        };
        self.shared.stats.record_evictions(evicted);

        for item in &items {
            hooks.fire(HookPoint::AfterSet, &item.key, Some(&item.value));
        }
        Ok(())
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> Result<()> {
        let (_, _, _, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeDelete, key, None);

        self.shared.data.write().await.entries.remove(key);

        hooks.fire(HookPoint::AfterDelete, key, None);
        Ok(())
    }

    // == Clear ==
    async fn clear(&self) -> Result<()> {
        self.shared.data.write().await.clear();
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        let mut data = self.shared.data.write().await;
        data.entries.retain(|key, _| !key.starts_with(prefix));
        data.compact_order();
        Ok(())
    }
}
