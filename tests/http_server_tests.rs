//! End-to-end tests against a live server bound to a local port.

use std::net::SocketAddr;
use std::sync::Arc;

use cacher::{create_router, AppState, CompressAlg, MemoryStore, StoreOptions};
use serde_json::{json, Value};

async fn spawn_server(compress_alg: CompressAlg, namespace: &str) -> (SocketAddr, AppState) {
    let memory = Arc::new(MemoryStore::new(StoreOptions::new()).unwrap());
    let state = AppState::new(memory, compress_alg, namespace);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

#[tokio::test]
async fn test_set_then_get_over_http() {
    let (addr, _state) = spawn_server(CompressAlg::Gzip, "").await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{}/set", addr))
        .json(&json!({"key": "1", "value": {"Name": "John"}}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = client
        .get(format!("http://{}/get/1", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["value"]["Name"], "John");
}

#[tokio::test]
async fn test_batch_over_http() {
    let (addr, state) = spawn_server(CompressAlg::Zlib, "users").await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{}/mset", addr))
        .json(&json!({"items": [
            {"key": "1", "value": "John"},
            {"key": "2", "value": "Jane"}
        ]}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(state.memory.len().await, 2);

    let body: Value = client
        .post(format!("http://{}/mget", addr))
        .json(&json!({"keys": ["2", "1"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["values"], json!(["Jane", "John"]));
}

#[tokio::test]
async fn test_not_found_over_http() {
    let (addr, _state) = spawn_server(CompressAlg::None, "").await;

    let response = reqwest::get(format!("http://{}/get/unknown", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}
