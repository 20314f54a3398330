//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Every handler works
//! through the default registered schema over JSON values.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::MemoryStore;
use crate::clock::SystemClock;
use crate::codec::CompressAlg;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, MGetRequest, MGetResponse,
    MSetRequest, MSetResponse, SetRequest, SetResponse, StatsResponse,
};
use crate::registry::{CacheProvider, CacheRegistry, MEMORY};
use crate::schema::Schema;
use crate::store::StoreOptions;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Providers, with the memory store registered as the default
    pub registry: CacheRegistry,
    /// The memory store itself, for stats and shutdown
    pub memory: Arc<MemoryStore<Vec<u8>>>,
}

impl AppState {
    /// Registers `memory` both under [`MEMORY`] and as the default provider.
    ///
    /// The default provider applies `compress_alg` and `namespace`; values
    /// reach the memory store already encoded.
    pub fn new(
        memory: Arc<MemoryStore<Vec<u8>>>,
        compress_alg: CompressAlg,
        namespace: impl Into<String>,
    ) -> Self {
        let registry = CacheRegistry::new();
        registry.register(CacheProvider::new(MEMORY, memory.clone()));
        registry.register_default(memory.clone(), compress_alg, namespace);

        Self { registry, memory }
    }

    /// Creates the memory store and registry from configuration.
    ///
    /// # Errors
    /// Fails on an unknown compression identifier or outside a Tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let compress_alg = config.compress_alg()?;
        let options = StoreOptions::new()
            .with_ttl(config.default_ttl())
            .with_max_items(config.max_items);
        let memory = MemoryStore::with_clock(options, Arc::new(SystemClock), config.reap_interval())?;

        Ok(Self::new(Arc::new(memory), compress_alg, config.namespace.clone()))
    }

    /// Schema over the default provider.
    pub fn schema(&self) -> Result<Schema<Value>> {
        self.registry
            .default_schema()
            .ok_or_else(|| CacheError::Configuration("no default cache registered".to_string()))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let params = req.into_params();
    state
        .schema()?
        .set(&params.key, params.value, params.ttl)
        .await?;

    Ok(Json(SetResponse::new(params.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.schema()?.get(&key).await?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for POST /mget
///
/// Returns the values found, skipping misses; 404 when none are found.
pub async fn mget_handler(
    State(state): State<AppState>,
    Json(req): Json<MGetRequest>,
) -> Result<Json<MGetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let keys: Vec<&str> = req.keys.iter().map(String::as_str).collect();
    let values = state.schema()?.mget(&keys).await?;

    Ok(Json(MGetResponse { values }))
}

/// Handler for PUT /mset
pub async fn mset_handler(
    State(state): State<AppState>,
    Json(req): Json<MSetRequest>,
) -> Result<Json<MSetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let items: Vec<_> = req.items.into_iter().map(SetRequest::into_params).collect();
    let count = items.len();
    state.schema()?.mset(items).await?;

    Ok(Json(MSetResponse::new(count)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.schema()?.delete(&key).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /clear
///
/// Clears the default cache's namespace, or the whole store without one.
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let schema = state.schema()?;
    schema.clear().await?;

    Ok(Json(ClearResponse::new(schema.namespace())))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.memory.stats().await.into())
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde_json::json;
    use std::time::Duration;

    fn test_state(namespace: &str) -> AppState {
        let memory = Arc::new(
            MemoryStore::new(StoreOptions::new().with_ttl(Duration::from_secs(300))).unwrap(),
        );
        AppState::new(memory, CompressAlg::None, namespace)
    }

    fn set_request(key: &str, value: Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state("");

        let req = set_request("users", json!({"name": "John", "age": "30"}));
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(State(state), Path("users".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value["name"], "John");
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state("");

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state("");

        set_handler(State(state.clone()), Json(set_request("to_delete", json!("value"))))
            .await
            .unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());

        let result = get_handler(State(state), Path("to_delete".to_string())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_handlers() {
        let state = test_state("");

        let req = MSetRequest {
            items: vec![set_request("1", json!("John")), set_request("2", json!("Jane"))],
        };
        let response = mset_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.count, 2);

        let req = MGetRequest {
            keys: vec!["1".to_string(), "3".to_string(), "2".to_string()],
        };
        let response = mget_handler(State(state), Json(req)).await.unwrap();
        assert_eq!(response.values, vec![json!("John"), json!("Jane")]);
    }

    #[tokio::test]
    async fn test_namespaced_state_writes_prefixed_keys() {
        let state = test_state("api");

        set_handler(State(state.clone()), Json(set_request("1", json!(1))))
            .await
            .unwrap();

        assert_eq!(state.memory.len().await, 1);
        assert!(state.memory.get("api:1").await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_handler() {
        let state = test_state("api");

        set_handler(State(state.clone()), Json(set_request("1", json!(1))))
            .await
            .unwrap();
        let response = clear_handler(State(state.clone())).await.unwrap();

        assert_eq!(response.namespace, "api");
        assert!(state.memory.is_empty().await);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state("");
        let _ = get_handler(State(state.clone()), Path("missing".to_string())).await;

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let state = test_state("");

        let result = set_handler(State(state), Json(set_request("", json!("value")))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_from_config_rejects_unknown_compression() {
        let config = Config {
            compression: Some("abc".to_string()),
            ..Config::default()
        };
        assert!(AppState::from_config(&config).is_err());

        let config = Config {
            compression: Some(CompressAlg::Gzip.to_string()),
            ..Config::default()
        };
        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.schema().unwrap().compress_alg(), CompressAlg::Gzip);
    }
}
