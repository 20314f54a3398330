//! Typed schemas sharing one store through the registry.

use std::sync::Arc;
use std::time::Duration;

use cacher::{
    CacheError, CacheProvider, CacheRegistry, CompressAlg, HookPoint, Hooks, MemoryStore, Params,
    Schema, SchemaConfig, Store, StoreOptions, Ttl,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

fn user(name: &str) -> User {
    User {
        name: name.to_string(),
    }
}

fn shared_store() -> Arc<MemoryStore<Vec<u8>>> {
    Arc::new(MemoryStore::new(StoreOptions::new().with_ttl(Duration::from_secs(60))).unwrap())
}

#[tokio::test]
async fn test_namespaces_share_store_without_collisions() {
    let store = shared_store();
    let cache1: Schema<User> =
        Schema::new(SchemaConfig::new(store.clone()).with_namespace("cache1"));
    let cache2: Schema<User> = Schema::new(
        SchemaConfig::new(store.clone())
            .with_namespace("cache2")
            .with_compression(CompressAlg::Gzip),
    );

    cache1.set("abc", user("John"), Ttl::Default).await.unwrap();
    cache2.set("abc", user("Jane"), Ttl::Default).await.unwrap();
    cache2.set("mno", user("Joe"), Ttl::Default).await.unwrap();

    assert_eq!(cache1.get("abc").await.unwrap(), user("John"));
    assert_eq!(cache2.get("abc").await.unwrap(), user("Jane"));
    assert_eq!(store.len().await, 3);

    cache1.clear().await.unwrap();

    assert!(matches!(cache1.get("abc").await, Err(CacheError::NotFound(_))));
    assert_eq!(cache2.get("mno").await.unwrap(), user("Joe"));
}

#[tokio::test]
async fn test_registry_inject_by_name() {
    let registry = CacheRegistry::new();
    registry.register(
        CacheProvider::new("users", shared_store())
            .with_compression(CompressAlg::Flate)
            .with_namespace("users"),
    );

    let schema = registry.schema::<User>("users").unwrap();
    schema
        .mset(vec![
            Params::new("1", user("John")),
            Params::new("2", user("Jane")).with_ttl(Ttl::Never),
        ])
        .await
        .unwrap();

    let users = schema.mget(&["1", "2", "3"]).await.unwrap();
    assert_eq!(users, vec![user("John"), user("Jane")]);

    assert!(registry.schema::<User>("missing").is_none());
    assert!(registry.default_schema::<User>().is_none());
}

#[tokio::test]
async fn test_schema_hooks_fire_around_operations() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = events.clone();
    let hooks = Hooks::new()
        .with(HookPoint::BeforeSet, {
            let log = log.clone();
            move |key: &str, _: Option<&User>| log.lock().unwrap().push(format!("before_set:{}", key))
        })
        .with(HookPoint::AfterGet, move |key: &str, value: Option<&User>| {
            let name = value.map(|u| u.name.clone()).unwrap_or_default();
            log.lock().unwrap().push(format!("after_get:{}:{}", key, name));
        });

    let schema: Schema<User> = Schema::new(SchemaConfig::new(shared_store()).with_hooks(hooks));
    schema.set("1", user("John"), Ttl::Default).await.unwrap();
    schema.get("1").await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["before_set:1".to_string(), "after_get:1:John".to_string()]
    );
}

#[tokio::test]
async fn test_store_ttl_applies_through_schema() {
    let store = shared_store();
    let schema: Schema<User> = Schema::new(SchemaConfig::new(store.clone()));

    schema
        .set("temp", user("John"), Ttl::After(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(schema.get("temp").await.is_err());
    assert!(store.get("temp").await.is_err());
}
