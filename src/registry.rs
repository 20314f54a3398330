//! Cache Registry
//!
//! Named providers binding a store to its compression and namespace settings,
//! from which typed schemas are handed out.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::codec::CompressAlg;
use crate::schema::{Schema, SchemaConfig};
use crate::store::{CacheValue, Store};

/// Name of the default provider.
pub const CACHE_MANAGER: &str = "cache_manager";

/// Conventional name for a provider backed by the in-memory store.
pub const MEMORY: &str = "memory";

// == Cache Provider ==
/// A store plus the settings every schema built from it shares.
#[derive(Clone)]
pub struct CacheProvider {
    pub name: String,
    pub store: Arc<dyn Store<Vec<u8>>>,
    pub compress_alg: CompressAlg,
    pub namespace: String,
}

impl CacheProvider {
    pub fn new(name: impl Into<String>, store: Arc<dyn Store<Vec<u8>>>) -> Self {
        Self {
            name: name.into(),
            store,
            compress_alg: CompressAlg::None,
            namespace: String::new(),
        }
    }

    pub fn with_compression(mut self, alg: CompressAlg) -> Self {
        self.compress_alg = alg;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Builds a schema over this provider, without hooks.
    pub fn schema<M: CacheValue>(&self) -> Schema<M> {
        Schema::new(
            SchemaConfig::new(Arc::clone(&self.store))
                .with_compression(self.compress_alg)
                .with_namespace(self.namespace.clone()),
        )
    }
}

impl std::fmt::Debug for CacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheProvider")
            .field("name", &self.name)
            .field("store", &self.store.name())
            .field("compress_alg", &self.compress_alg)
            .field("namespace", &self.namespace)
            .finish()
    }
}

// == Cache Registry ==
/// Thread-safe map of providers by name.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    providers: Arc<RwLock<HashMap<String, CacheProvider>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider under its own name, replacing any previous one.
    pub fn register(&self, provider: CacheProvider) {
        let mut providers = match self.providers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        info!(
            "Registering cache provider '{}' ({} store)",
            provider.name,
            provider.store.name()
        );
        if let Some(previous) = providers.insert(provider.name.clone(), provider) {
            warn!("Replaced existing cache provider '{}'", previous.name);
        }
    }

    /// Registers `store` as the default provider.
    pub fn register_default(
        &self,
        store: Arc<dyn Store<Vec<u8>>>,
        compress_alg: CompressAlg,
        namespace: impl Into<String>,
    ) {
        self.register(
            CacheProvider::new(CACHE_MANAGER, store)
                .with_compression(compress_alg)
                .with_namespace(namespace),
        );
    }

    /// Looks up a provider by name.
    pub fn inject(&self, name: &str) -> Option<CacheProvider> {
        let providers = match self.providers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        providers.get(name).cloned()
    }

    /// Builds a schema over the named provider.
    pub fn schema<M: CacheValue>(&self, name: &str) -> Option<Schema<M>> {
        self.inject(name).map(|provider| provider.schema())
    }

    /// Builds a schema over the default provider.
    pub fn default_schema<M: CacheValue>(&self) -> Option<Schema<M>> {
        self.schema(CACHE_MANAGER)
    }

    pub fn names(&self) -> Vec<String> {
        let providers = match self.providers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }
}
