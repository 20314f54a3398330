//! RocksDB Store
//!
//! Embedded LSM store without native TTL. Every value carries its expiry in
//! an 8-byte header; expired values are deleted when read.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ::rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use tokio::sync::RwLock;
use tracing::warn;

use crate::backends::{frame, is_expired, unframe};
use crate::clock::{Clock, SystemClock};
use crate::codec::{self, CompressAlg};
use crate::error::{CacheError, Result};
use crate::hooks::{HookPoint, Hooks};
use crate::store::{CacheValue, Params, Store, StoreOptions, Ttl};

// == RocksDB Store ==
pub struct RocksStore<M> {
    db: Arc<DB>,
    options: RwLock<StoreOptions<M>>,
    clock: Arc<dyn Clock>,
}

impl<M: CacheValue> RocksStore<M> {
    /// Opens (or creates) a database directory at `path`.
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions<M>) -> Result<Self> {
        Self::open_with_clock(path, options, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        options: StoreOptions<M>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || {
            let mut db_options = Options::default();
            db_options.create_if_missing(true);
            DB::open(&db_options, path)
        })
        .await
        .map_err(CacheError::backend)?
        .map_err(CacheError::backend)?;

        Ok(Self {
            db: Arc::new(db),
            options: RwLock::new(options),
            clock,
        })
    }

    async fn settings(&self) -> (Ttl, CompressAlg, Hooks<M>) {
        let options = self.options.read().await;
        (options.ttl, options.compress_alg, options.hooks.clone())
    }

    /// Runs `f` on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DB) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(CacheError::backend)?
    }

    /// Reads the live payload for `key`, deleting it if expired.
    async fn read_live(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_ms();
        let key = key.to_string();
        self.call(move |db| {
            let Some(framed) = db.get(key.as_bytes()).map_err(CacheError::backend)? else {
                return Ok(None);
            };

            let (expires_at, payload) = unframe(&framed)?;
            if is_expired(expires_at, now) {
                db.delete(key.as_bytes()).map_err(CacheError::backend)?;
                return Ok(None);
            }
            Ok(Some(payload.to_vec()))
        })
        .await
    }

    /// Deletes every key starting with `prefix` in one batch.
    async fn delete_prefix(&self, prefix: Vec<u8>) -> Result<()> {
        self.call(move |db| {
            let mode = if prefix.is_empty() {
                IteratorMode::Start
            } else {
                IteratorMode::From(&prefix, Direction::Forward)
            };

            let mut batch = WriteBatch::default();
            for item in db.iterator(mode) {
                let (key, _) = item.map_err(CacheError::backend)?;
                if !key.starts_with(&prefix) {
                    break;
                }
                batch.delete(key);
            }
            db.write(batch).map_err(CacheError::backend)
        })
        .await
    }
}

#[async_trait]
impl<M: CacheValue> Store<M> for RocksStore<M> {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    async fn set_options(&self, options: StoreOptions<M>) {
        *self.options.write().await = options;
    }

    async fn hooks(&self) -> Hooks<M> {
        self.options.read().await.hooks.clone()
    }

    async fn get(&self, key: &str) -> Result<M> {
        let (_, alg, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeGet, key, None);

        let payload = self
            .read_live(key)
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        let value: M = codec::decode_value(&payload, alg)?;
        hooks.fire(HookPoint::AfterGet, key, Some(&value));
        Ok(value)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<M>> {
        let (_, alg, _) = self.settings().await;

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(payload) = self.read_live(key).await? {
                match codec::decode_value(&payload, alg) {
                    Ok(value) => values.push(value),
                    Err(err) => warn!("Skipping undecodable rocksdb value '{}' in mget: {}", key, err),
                }
            }
        }

        if values.is_empty() {
            return Err(CacheError::NotFound(keys.join(",")));
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: M, ttl: Ttl) -> Result<()> {
        let (default_ttl, alg, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeSet, key, Some(&value));

        let expires_at = ttl.or(default_ttl).expires_at(self.clock.now_ms());
        let framed = frame(expires_at, &codec::encode(&value, alg)?);
        let owned_key = key.to_string();
        self.call(move |db| db.put(owned_key.as_bytes(), framed).map_err(CacheError::backend))
            .await?;

        hooks.fire(HookPoint::AfterSet, key, Some(&value));
        Ok(())
    }

    /// Writes every item in one atomic batch.
    async fn mset(&self, items: Vec<Params<M>>) -> Result<()> {
        let (default_ttl, alg, hooks) = self.settings().await;
        let now = self.clock.now_ms();

        let mut batch = WriteBatch::default();
        for item in &items {
            hooks.fire(HookPoint::BeforeSet, &item.key, Some(&item.value));
            let expires_at = item.ttl.or(default_ttl).expires_at(now);
            batch.put(item.key.as_bytes(), frame(expires_at, &codec::encode(&item.value, alg)?));
        }

        self.call(move |db| db.write(batch).map_err(CacheError::backend))
            .await?;

        for item in &items {
            hooks.fire(HookPoint::AfterSet, &item.key, Some(&item.value));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (_, _, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeDelete, key, None);

        let owned_key = key.to_string();
        self.call(move |db| db.delete(owned_key.as_bytes()).map_err(CacheError::backend))
            .await?;

        hooks.fire(HookPoint::AfterDelete, key, None);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.delete_prefix(Vec::new()).await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        self.delete_prefix(prefix.as_bytes().to_vec()).await
    }
}
