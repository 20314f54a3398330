//! Memcached Store
//!
//! Expiry is delegated to memcached in whole seconds. The client is blocking,
//! so every call runs on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use ::memcache::Client;
use tokio::sync::RwLock;
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::codec::{self, CompressAlg};
use crate::error::{CacheError, Result};
use crate::hooks::{HookPoint, Hooks};
use crate::store::{CacheValue, Params, Store, StoreOptions, Ttl};

/// Relative expirations above this many seconds (30 days) are read by
/// memcached as absolute unix timestamps.
const MAX_RELATIVE_SECS: u64 = 30 * 24 * 3600;

/// What a write turns into once the TTL is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    Persist,
    /// Exptime as sent on the wire
    Expire(u32),
    Remove,
}

impl Write {
    fn from_ttl(ttl: Ttl, now_ms: u64) -> Self {
        let ttl = match ttl {
            Ttl::After(ttl) if ttl.is_zero() => return Write::Remove,
            Ttl::After(ttl) => ttl,
            Ttl::Default | Ttl::Never => return Write::Persist,
        };

        // Partial seconds round up so the key is never dropped early
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        let exptime = if secs <= MAX_RELATIVE_SECS {
            secs
        } else {
            (now_ms / 1_000).saturating_add(secs)
        };

        match u32::try_from(exptime) {
            Ok(exptime) => Write::Expire(exptime),
            // Past the 32-bit timestamp range; memcached cannot expire it
            Err(_) => Write::Persist,
        }
    }

    fn exptime(self) -> u32 {
        match self {
            Write::Expire(exptime) => exptime,
            Write::Persist | Write::Remove => 0,
        }
    }
}

// == Memcached Store ==
pub struct MemcacheStore<M> {
    client: Arc<Client>,
    options: RwLock<StoreOptions<M>>,
    clock: Arc<dyn Clock>,
}

impl<M: CacheValue> MemcacheStore<M> {
    /// Connects to `url`, e.g. `memcache://127.0.0.1:11211`.
    pub async fn connect(url: &str, options: StoreOptions<M>) -> Result<Self> {
        let url = url.to_string();
        let client = tokio::task::spawn_blocking(move || Client::connect(url))
            .await
            .map_err(CacheError::backend)?
            .map_err(CacheError::backend)?;

        Ok(Self {
            client: Arc::new(client),
            options: RwLock::new(options),
            clock: Arc::new(SystemClock),
        })
    }

    async fn settings(&self) -> (Ttl, CompressAlg, Hooks<M>) {
        let options = self.options.read().await;
        (options.ttl, options.compress_alg, options.hooks.clone())
    }

    /// Runs `f` on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Client) -> std::result::Result<T, ::memcache::MemcacheError> + Send + 'static,
        T: Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client).map_err(CacheError::backend))
            .await
            .map_err(CacheError::backend)?
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.call(move |client| client.get::<Vec<u8>>(&key)).await
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, write: Write) -> Result<()> {
        let key = key.to_string();
        match write {
            Write::Remove => self.call(move |client| client.delete(&key).map(|_| ())).await,
            write => {
                self.call(move |client| client.set(&key, bytes.as_slice(), write.exptime()))
                    .await
            }
        }
    }
}

#[async_trait]
impl<M: CacheValue> Store<M> for MemcacheStore<M> {
    fn name(&self) -> &'static str {
        "memcache"
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

        let bytes = self
            .read(key)
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        let value: M = codec::decode_value(&bytes, alg)?;
        hooks.fire(HookPoint::AfterGet, key, Some(&value));
        Ok(value)
    }

    /// One `get` per key; backend failures abort the batch.
    async fn mget(&self, keys: &[&str]) -> Result<Vec<M>> {
        let (_, alg, _) = self.settings().await;

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.read(key).await? else {
                continue;
            };
            match codec::decode_value(&bytes, alg) {
                Ok(value) => values.push(value),
                Err(err) => warn!("Skipping undecodable memcached value '{}' in mget: {}", key, err),
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

        let bytes = codec::encode(&value, alg)?;
        let write = Write::from_ttl(ttl.or(default_ttl), self.clock.now_ms());
        self.write(key, bytes, write).await?;

        hooks.fire(HookPoint::AfterSet, key, Some(&value));
        Ok(())
    }

    /// Writes items one by one, stopping at the first failure.
    async fn mset(&self, items: Vec<Params<M>>) -> Result<()> {
        for item in items {
            self.set(&item.key, item.value, item.ttl).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (_, _, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeDelete, key, None);

        let owned_key = key.to_string();
        self.call(move |client| client.delete(&owned_key).map(|_| ()))
            .await?;

        hooks.fire(HookPoint::AfterDelete, key, None);
        Ok(())
    }

    /// Flushes every key on the server.
    async fn clear(&self) -> Result<()> {
        self.call(|client| client.flush()).await
    }

    /// Memcached cannot list keys, so only the empty prefix is supported.
    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return self.call(|client| client.flush()).await;
        }
        Err(CacheError::backend(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("memcached cannot clear keys by prefix '{}'", prefix),
        )))
    }
}
