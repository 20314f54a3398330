//! Redis Store
//!
//! Expiry is delegated to Redis through `SET .. PX`.

use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::saturating_millis;
use crate::codec::{self, CompressAlg};
use crate::error::{CacheError, Result};
use crate::hooks::{HookPoint, Hooks};
use crate::store::{CacheValue, Params, Store, StoreOptions, Ttl};

/// Keys deleted per `SCAN` page during a prefix clear.
const SCAN_COUNT: usize = 100;

/// Largest `PX` value sent. Redis rejects expiries that overflow once added
/// to its own clock, so longer TTLs are written without one.
const MAX_EXPIRE_MS: u64 = (i64::MAX as u64) / 2;

/// What a write turns into once the TTL is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    Persist,
    Expire(u64),
    Remove,
}

impl Write {
    fn from_ttl(ttl: Ttl) -> Self {
        match ttl {
            Ttl::After(ttl) if ttl.is_zero() => Write::Remove,
            Ttl::After(ttl) => match saturating_millis(ttl).max(1) {
                ms if ms > MAX_EXPIRE_MS => Write::Persist,
                ms => Write::Expire(ms),
            },
            Ttl::Default | Ttl::Never => Write::Persist,
        }
    }
}

/// Escapes glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

// == Redis Store ==
pub struct RedisStore<M> {
    conn: ConnectionManager,
    options: RwLock<StoreOptions<M>>,
}

impl<M: CacheValue> RedisStore<M> {
    /// Connects to `url`, e.g. `redis://localhost:6379/0`.
    pub async fn connect(url: &str, options: StoreOptions<M>) -> Result<Self> {
        let client = Client::open(url).map_err(CacheError::backend)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(CacheError::backend)?;

        Ok(Self {
            conn,
            options: RwLock::new(options),
        })
    }

    async fn settings(&self) -> (Ttl, CompressAlg, Hooks<M>) {
        let options = self.options.read().await;
        (options.ttl, options.compress_alg, options.hooks.clone())
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, write: Write) -> Result<()> {
        let mut conn = self.conn.clone();
        let result = match write {
            Write::Persist => conn.set::<_, _, ()>(key, bytes).await,
            Write::Expire(ms) => {
                ::redis::cmd("SET")
                    .arg(key)
                    .arg(bytes)
                    .arg("PX")
                    .arg(ms)
                    .query_async::<_, ()>(&mut conn)
                    .await
            }
            Write::Remove => conn.del::<_, ()>(key).await,
        };
        result.map_err(CacheError::backend)
    }
}

#[async_trait]
impl<M: CacheValue> Store<M> for RedisStore<M> {
    fn name(&self) -> &'static str {
        "redis"
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

        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn.get(key).await.map_err(CacheError::backend)?;
        let bytes = bytes.ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        let value: M = codec::decode_value(&bytes, alg)?;
        hooks.fire(HookPoint::AfterGet, key, Some(&value));
        Ok(value)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<M>> {
        if keys.is_empty() {
            return Err(CacheError::NotFound(String::new()));
        }
        let (_, alg, _) = self.settings().await;

        let mut conn = self.conn.clone();
        let found: Vec<Option<Vec<u8>>> = ::redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::backend)?;

        let values: Vec<M> = keys
            .iter()
            .zip(found)
            .filter_map(|(key, bytes)| match codec::decode_value(&bytes?, alg) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Skipping undecodable redis value '{}' in mget: {}", key, err);
                    None
                }
            })
            .collect();
        if values.is_empty() {
            return Err(CacheError::NotFound(keys.join(",")));
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: M, ttl: Ttl) -> Result<()> {
        let (default_ttl, alg, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeSet, key, Some(&value));

        let bytes = codec::encode(&value, alg)?;
        self.write(key, bytes, Write::from_ttl(ttl.or(default_ttl)))
            .await?;

        hooks.fire(HookPoint::AfterSet, key, Some(&value));
        Ok(())
    }

    /// Sends every item in one `MULTI`/`EXEC` pipeline.
    async fn mset(&self, items: Vec<Params<M>>) -> Result<()> {
        let (default_ttl, alg, hooks) = self.settings().await;

        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for item in &items {
            hooks.fire(HookPoint::BeforeSet, &item.key, Some(&item.value));
            let bytes = codec::encode(&item.value, alg)?;
            match Write::from_ttl(item.ttl.or(default_ttl)) {
                Write::Persist => pipe.cmd("SET").arg(&item.key).arg(bytes).ignore(),
                Write::Expire(ms) => pipe
                    .cmd("SET")
                    .arg(&item.key)
                    .arg(bytes)
                    .arg("PX")
                    .arg(ms)
                    .ignore(),
                Write::Remove => pipe.cmd("DEL").arg(&item.key).ignore(),
            };
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::backend)?;

        for item in &items {
            hooks.fire(HookPoint::AfterSet, &item.key, Some(&item.value));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (_, _, hooks) = self.settings().await;
        hooks.fire(HookPoint::BeforeDelete, key, None);

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(CacheError::backend)?;

        hooks.fire(HookPoint::AfterDelete, key, None);
        Ok(())
    }

    /// Flushes the selected logical database.
    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        ::redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::backend)
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        let pattern = glob_escape(prefix);
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::backend)?;

            if !keys.is_empty() {
                removed += keys.len();
                conn.del::<_, ()>(keys).await.map_err(CacheError::backend)?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Cleared {} redis keys with prefix '{}'", removed, prefix);
        Ok(())
    }
}
