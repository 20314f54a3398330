//! Schema Facade
//!
//! Typed, namespaced, optionally compressed view over a byte store. Several
//! schemas can share one store; their namespaces keep the keys apart.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::{self, CompressAlg};
use crate::error::{CacheError, Result};
use crate::hooks::{HookPoint, Hooks};
use crate::store::{CacheValue, Params, Store, Ttl};

// == Schema Config ==
/// Everything a schema binds together.
pub struct SchemaConfig<M> {
    pub store: Arc<dyn Store<Vec<u8>>>,
    pub compress_alg: CompressAlg,
    pub hooks: Hooks<M>,
    pub namespace: String,
}

impl<M> SchemaConfig<M> {
    pub fn new(store: Arc<dyn Store<Vec<u8>>>) -> Self {
        Self {
            store,
            compress_alg: CompressAlg::None,
            hooks: Hooks::new(),
            namespace: String::new(),
        }
    }

    pub fn with_compression(mut self, alg: CompressAlg) -> Self {
        self.compress_alg = alg;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks<M>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

impl<M> Clone for SchemaConfig<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            compress_alg: self.compress_alg,
            hooks: self.hooks.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

// == Schema ==
/// Typed cache handle.
///
/// Values are stored as JSON, or as compressed JSON when an algorithm is set.
/// Hooks registered here see the caller's key, without the namespace.
pub struct Schema<M> {
    config: SchemaConfig<M>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: CacheValue> Schema<M> {
    pub fn new(config: SchemaConfig<M>) -> Self {
        Self {
            config,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn compress_alg(&self) -> CompressAlg {
        self.config.compress_alg
    }

    pub fn hooks(&self) -> &Hooks<M> {
        &self.config.hooks
    }

    pub fn store(&self) -> &Arc<dyn Store<Vec<u8>>> {
        &self.config.store
    }

    /// Key as seen by the underlying store: `"<namespace>:<key>"`, or the key
    /// unchanged when no namespace is set.
    pub fn key_for(&self, key: &str) -> String {
        if self.config.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.namespace, key)
        }
    }

    // == Get ==
    pub async fn get(&self, key: &str) -> Result<M> {
        self.config.hooks.fire(HookPoint::BeforeGet, key, None);

        let bytes = self.config.store.get(&self.key_for(key)).await?;
        let value: M = codec::decode_value(&bytes, self.config.compress_alg)?;

        self.config.hooks.fire(HookPoint::AfterGet, key, Some(&value));
        Ok(value)
    }

    // == MGet ==
    /// Fans out to [`Schema::get`], skipping keys that are not found.
    ///
    /// Any other error aborts the batch. Fails with NotFound only when none of
    /// the keys resolve.
    pub async fn mget(&self, keys: &[&str]) -> Result<Vec<M>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(key).await {
                Ok(value) => values.push(value),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }

        if values.is_empty() {
            return Err(CacheError::NotFound(keys.join(",")));
        }
        Ok(values)
    }

    // == Set ==
    pub async fn set(&self, key: &str, value: M, ttl: Ttl) -> Result<()> {
        self.config.hooks.fire(HookPoint::BeforeSet, key, Some(&value));

        let bytes = codec::encode(&value, self.config.compress_alg)?;
        self.config.store.set(&self.key_for(key), bytes, ttl).await?;

        self.config.hooks.fire(HookPoint::AfterSet, key, Some(&value));
        Ok(())
    }

    // == MSet ==
    /// Fans out to [`Schema::set`] in order, stopping at the first failure.
    pub async fn mset(&self, items: Vec<Params<M>>) -> Result<()> {
        for item in items {
            self.set(&item.key, item.value, item.ttl).await?;
        }
        Ok(())
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.config.hooks.fire(HookPoint::BeforeDelete, key, None);

        self.config.store.delete(&self.key_for(key)).await?;

        self.config.hooks.fire(HookPoint::AfterDelete, key, None);
        Ok(())
    }

    // == Clear ==
    /// Removes this schema's keys. Without a namespace the whole store is cleared.
    pub async fn clear(&self) -> Result<()> {
        if self.config.namespace.is_empty() {
            self.config.store.clear().await
        } else {
            self.config
                .store
                .clear_prefix(&format!("{}:", self.config.namespace))
                .await
        }
    }
}

impl<M> Clone for Schema<M> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for Schema<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("store", &self.config.store.name())
            .field("namespace", &self.config.namespace)
            .field("compress_alg", &self.config.compress_alg)
            .field("hooks", &self.config.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::store::StoreOptions;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: String,
    }

    fn john() -> Person {
        Person {
            name: "John".to_string(),
            age: "30".to_string(),
        }
    }

    fn memory() -> Arc<dyn Store<Vec<u8>>> {
        Arc::new(
            MemoryStore::new(StoreOptions::new().with_ttl(Duration::from_secs(15 * 60))).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_schema_set_and_get() {
        let schema: Schema<Person> = Schema::new(SchemaConfig::new(memory()));

        assert_ok!(schema.set("users", john(), Ttl::Default).await);
        assert_eq!(schema.get("users").await.unwrap(), john());
    }

    #[tokio::test]
    async fn test_schema_get_missing() {
        let schema: Schema<Person> = Schema::new(SchemaConfig::new(memory()));

        let err = schema.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_schema_compression_round_trip() {
        for alg in CompressAlg::ALL {
            let schema: Schema<Person> =
                Schema::new(SchemaConfig::new(memory()).with_compression(alg));

            schema.set("users", john(), Ttl::Default).await.unwrap();
            assert_eq!(schema.get("users").await.unwrap(), john(), "algorithm {}", alg);
        }
    }

    #[tokio::test]
    async fn test_schema_reads_plain_json_with_compression_enabled() {
        let store = memory();
        let plain: Schema<Person> = Schema::new(SchemaConfig::new(Arc::clone(&store)));
        let zipped: Schema<Person> =
            Schema::new(SchemaConfig::new(store).with_compression(CompressAlg::Zlib));

        plain.set("users", john(), Ttl::Default).await.unwrap();
        assert_eq!(zipped.get("users").await.unwrap(), john());
    }

    #[tokio::test]
    async fn test_schema_namespace_isolation() {
        let store = memory();
        let cache1: Schema<String> =
            Schema::new(SchemaConfig::new(Arc::clone(&store)).with_namespace("cache1"));
        let cache2: Schema<String> =
            Schema::new(SchemaConfig::new(Arc::clone(&store)).with_namespace("cache2"));

        cache1.set("1", "abc".to_string(), Ttl::Default).await.unwrap();
        cache2.set("1", "mno".to_string(), Ttl::Default).await.unwrap();

        assert_eq!(cache1.get("1").await.unwrap(), "abc");
        assert_eq!(cache2.get("1").await.unwrap(), "mno");
        assert_ok!(store.get("cache1:1").await);
    }

    #[tokio::test]
    async fn test_schema_key_for() {
        let plain: Schema<String> = Schema::new(SchemaConfig::new(memory()));
        let scoped: Schema<String> = Schema::new(SchemaConfig::new(memory()).with_namespace("ns"));

        assert_eq!(plain.key_for("1"), "1");
        assert_eq!(scoped.key_for("1"), "ns:1");
        assert_eq!(scoped.namespace(), "ns");
    }

    #[tokio::test]
    async fn test_schema_clear_is_namespace_scoped() {
        let store = memory();
        let cache1: Schema<String> =
            Schema::new(SchemaConfig::new(Arc::clone(&store)).with_namespace("cache1"));
        let cache2: Schema<String> =
            Schema::new(SchemaConfig::new(Arc::clone(&store)).with_namespace("cache2"));

        cache1.set("1", "abc".to_string(), Ttl::Default).await.unwrap();
        cache2.set("1", "mno".to_string(), Ttl::Default).await.unwrap();
        cache1.clear().await.unwrap();

        assert_err!(cache1.get("1").await);
        assert_eq!(cache2.get("1").await.unwrap(), "mno");
    }

    #[tokio::test]
    async fn test_schema_clear_without_namespace_clears_store() {
        let store = memory();
        let global: Schema<String> = Schema::new(SchemaConfig::new(Arc::clone(&store)));
        let scoped: Schema<String> =
            Schema::new(SchemaConfig::new(Arc::clone(&store)).with_namespace("cache1"));

        scoped.set("1", "abc".to_string(), Ttl::Default).await.unwrap();
        global.clear().await.unwrap();

        assert_err!(scoped.get("1").await);
    }

    #[tokio::test]
    async fn test_schema_mget_skips_missing() {
        let schema: Schema<String> = Schema::new(SchemaConfig::new(memory()));

        schema
            .mset(vec![
                Params::new("1", "John".to_string()),
                Params::new("2", "Jane".to_string()),
            ])
            .await
            .unwrap();

        let values = schema.mget(&["1", "999", "2"]).await.unwrap();
        assert_eq!(values, vec!["John".to_string(), "Jane".to_string()]);

        let err = schema.mget(&["998", "999"]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_schema_mset_per_item_ttl() {
        let schema: Schema<String> = Schema::new(SchemaConfig::new(memory()));

        schema
            .mset(vec![
                Params::new("short", "s".to_string()).with_ttl(Duration::ZERO),
                Params::new("long", "l".to_string()),
            ])
            .await
            .unwrap();

        assert_err!(schema.get("short").await);
        assert_eq!(schema.get("long").await.unwrap(), "l");
    }

    #[tokio::test]
    async fn test_schema_delete() {
        let schema: Schema<String> = Schema::new(SchemaConfig::new(memory()));

        schema.set("1", "John".to_string(), Ttl::Default).await.unwrap();
        schema.delete("1").await.unwrap();

        assert_err!(schema.get("1").await);
    }

    #[tokio::test]
    async fn test_schema_hooks_see_caller_key() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let hooks = Hooks::new().with(HookPoint::AfterSet, move |key: &str, value: Option<&String>| {
            log.lock()
                .unwrap()
                .push(format!("{}={}", key, value.cloned().unwrap_or_default()));
        });
        let schema: Schema<String> = Schema::new(
            SchemaConfig::new(memory())
                .with_namespace("users")
                .with_hooks(hooks),
        );

        schema.set("1", "John".to_string(), Ttl::Default).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["1=John".to_string()]);
        assert_eq!(schema.hooks().len(), 1);
    }

    #[tokio::test]
    async fn test_schema_after_get_not_fired_on_miss() {
        let fired = Arc::new(Mutex::new(0));
        let count = Arc::clone(&fired);
        let schema: Schema<String> = Schema::new(SchemaConfig::new(memory()).with_hooks(
            Hooks::new().with(HookPoint::AfterGet, move |_, _| *count.lock().unwrap() += 1),
        ));

        let _ = schema.get("missing").await;
        assert_eq!(*fired.lock().unwrap(), 0);
    }
}
