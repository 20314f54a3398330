//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::store::{Params, Ttl};

/// Converts an optional TTL in seconds: absent = store default, 0 = never expire.
fn ttl_from_secs(ttl: Option<u64>) -> Ttl {
    ttl.map(Ttl::from_secs).unwrap_or_default()
}

fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    None
}

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (uses default if not specified, 0 = never expire)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    pub fn ttl(&self) -> Ttl {
        ttl_from_secs(self.ttl)
    }

    pub fn into_params(self) -> Params<Value> {
        let ttl = self.ttl();
        Params::new(self.key, self.value).with_ttl(ttl)
    }
}

/// Request body for the batch read (POST /mget)
#[derive(Debug, Clone, Deserialize)]
pub struct MGetRequest {
    pub keys: Vec<String>,
}

impl MGetRequest {
    pub fn validate(&self) -> Option<String> {
        if self.keys.is_empty() {
            return Some("At least one key is required".to_string());
        }
        self.keys.iter().find_map(|key| validate_key(key))
    }
}

/// Request body for the batch write (PUT /mset)
#[derive(Debug, Clone, Deserialize)]
pub struct MSetRequest {
    pub items: Vec<SetRequest>,
}

impl MSetRequest {
    pub fn validate(&self) -> Option<String> {
        self.items.iter().find_map(SetRequest::validate)
    }
}
