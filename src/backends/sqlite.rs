//! SQLite Store
//!
//! One `cache` table with an expiry column. Reads filter expired rows; a
//! background reaper deletes them.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{watch, RwLock};
use tracing::warn;

use crate::cache::DEFAULT_REAP_INTERVAL;
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::error::{CacheError, Result};
use crate::hooks::{HookPoint, Hooks};
use crate::store::{CacheValue, Params, Store, StoreOptions, Ttl};
use crate::tasks::{spawn_reaper, Reap};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER
)";

const UPSERT: &str = "INSERT OR REPLACE INTO cache (key, value, expires_at) VALUES (?1, ?2, ?3)";

const SELECT_LIVE: &str =
    "SELECT value FROM cache WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)";

// == Connection ==
/// Connection shared with blocking tasks and the reaper.
struct Db {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl Db {
    /// Current time as a SQLite integer.
    fn now(&self) -> i64 {
        i64::try_from(self.clock.now_ms()).unwrap_or(i64::MAX)
    }

    /// Runs `f` on the blocking pool with the connection locked.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut conn).map_err(CacheError::backend)
        })
        .await
        .map_err(CacheError::backend)?
    }
}

#[async_trait]
impl Reap for Db {
    fn label(&self) -> &'static str {
        "sqlite"
    }

    async fn reap(&self) -> usize {
        let now = self.now();
        let result = self
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )
            })
            .await;

        match result {
            Ok(removed) => removed,
            Err(err) => {
                warn!("sqlite reaper failed: {}", err);
                0
            }
        }
    }
}

// == SQLite Store ==
pub struct SqliteStore<M> {
    db: Arc<Db>,
    options: RwLock<StoreOptions<M>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<M: CacheValue> SqliteStore<M> {
    /// Opens (or creates) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions<M>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || Connection::open(path))
            .await
            .map_err(CacheError::backend)?
            .map_err(CacheError::backend)?;
        Self::from_connection(conn, options, Arc::new(SystemClock), DEFAULT_REAP_INTERVAL).await
    }

    /// Opens a private in-memory database.
    pub async fn open_in_memory(options: StoreOptions<M>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(CacheError::backend)?;
        Self::from_connection(conn, options, Arc::new(SystemClock), DEFAULT_REAP_INTERVAL).await
    }

    /// Wraps an existing connection, creating the table if needed.
    pub async fn from_connection(
        conn: Connection,
        options: StoreOptions<M>,
        clock: Arc<dyn Clock>,
        reap_interval: Duration,
    ) -> Result<Self> {
        let db = Arc::new(Db {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        });
        db.call(|conn| conn.execute_batch(CREATE_TABLE)).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_reaper(Arc::downgrade(&db), reap_interval, shutdown_rx);

        Ok(Self {
            db,
            options: RwLock::new(options),
            shutdown_tx,
        })
    }

    /// Stops the background reaper.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Deletes expired rows now, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.db.reap().await
    }

    async fn settings(&self) -> (Ttl, codec::CompressAlg, Hooks<M>) {
        let options = self.options.read().await;
        (options.ttl, options.compress_alg, options.hooks.clone())
    }

    fn expires_at(&self, ttl: Ttl, default_ttl: Ttl) -> Option<i64> {
        ttl.or(default_ttl)
            .expires_at(self.db.clock.now_ms())
            .map(|at| i64::try_from(at).unwrap_or(i64::MAX))
    }
}

impl<M> Drop for SqliteStore<M> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[async_trait]
impl<M: CacheValue> Store<M> for SqliteStore<M> {
    fn name(&self) -> &'static str {
        "sqlite"
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

        let now = self.db.now();
        let owned_key = key.to_string();
        let bytes = self
            .db
            .call(move |conn| {
                conn.query_row(SELECT_LIVE, params![owned_key, now], |row| {
                    row.get::<_, Vec<u8>>(0)
                })
                .optional()
            })
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        let value: M = codec::decode_value(&bytes, alg)?;
        hooks.fire(HookPoint::AfterGet, key, Some(&value));
        Ok(value)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<M>> {
        let (_, alg, _) = self.settings().await;

        let now = self.db.now();
        let owned: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(SELECT_LIVE)?;
                let mut rows = Vec::with_capacity(owned.len());
                for key in &owned {
                    if let Some(bytes) = stmt
                        .query_row(params![key, now], |row| row.get::<_, Vec<u8>>(0))
                        .optional()?
                    {
                        rows.push((key.clone(), bytes));
                    }
                }
                Ok(rows)
            })
            .await?;

        let values: Vec<M> = rows
            .iter()
            .filter_map(|(key, bytes)| match codec::decode_value(bytes, alg) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Skipping undecodable sqlite row '{}' in mget: {}", key, err);
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
        let expires_at = self.expires_at(ttl, default_ttl);
        let owned_key = key.to_string();
        self.db
            .call(move |conn| conn.execute(UPSERT, params![owned_key, bytes, expires_at]))
            .await?;

        hooks.fire(HookPoint::AfterSet, key, Some(&value));
        Ok(())
    }

    /// Writes every item in one transaction.
    async fn mset(&self, items: Vec<Params<M>>) -> Result<()> {
        let (default_ttl, alg, hooks) = self.settings().await;

        let mut rows = Vec::with_capacity(items.len());
        for item in &items {
            hooks.fire(HookPoint::BeforeSet, &item.key, Some(&item.value));
            let bytes = codec::encode(&item.value, alg)?;
            rows.push((item.key.clone(), bytes, self.expires_at(item.ttl, default_ttl)));
        }

        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(UPSERT)?;
                    for (key, bytes, expires_at) in &rows {
                        stmt.execute(params![key, bytes, expires_at])?;
                    }
                }
                tx.commit()
            })
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
        self.db
            .call(move |conn| conn.execute("DELETE FROM cache WHERE key = ?1", params![owned_key]))
            .await?;

        hooks.fire(HookPoint::AfterDelete, key, None);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.db
            .call(|conn| conn.execute("DELETE FROM cache", []))
            .await?;
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = prefix.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM cache WHERE substr(key, 1, length(?1)) = ?1",
                    params![prefix],
                )
            })
            .await?;
        Ok(())
    }
}
