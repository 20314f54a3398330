//! Configuration Module
//!
//! Loads store and server settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::CompressAlg;
use crate::error::Result;
use crate::store::Ttl;

/// Store and server configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the memory store holds, 0 = unbounded
    pub max_items: usize,
    /// Default TTL in seconds for entries without explicit TTL, 0 = never expire
    pub default_ttl: u64,
    /// Reaper sweep interval in milliseconds
    pub reap_interval_ms: u64,
    /// Compression algorithm identifier, None = no compression
    pub compression: Option<String>,
    /// Key namespace of the default cache, empty = none
    pub namespace: String,
    /// HTTP server port
    pub server_port: u16,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ITEMS` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `REAP_INTERVAL_MS` - Reaper frequency in milliseconds (default: 1000)
    /// - `CACHE_COMPRESSION` - `gzip`, `flate` or `zlib` (default: unset)
    /// - `CACHE_NAMESPACE` - Key namespace (default: empty)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    ///
    /// The compression identifier is not validated here; an unknown value
    /// fails store construction instead.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_items: env_or("MAX_ITEMS", defaults.max_items),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            reap_interval_ms: env_or("REAP_INTERVAL_MS", defaults.reap_interval_ms),
            compression: env::var("CACHE_COMPRESSION").ok().filter(|v| !v.is_empty()),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or_default(),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Default TTL as a store setting.
    pub fn default_ttl(&self) -> Ttl {
        Ttl::from_secs(self.default_ttl)
    }

    /// Reaper interval, clamped to at least one millisecond.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms.max(1))
    }

    /// Parsed compression algorithm.
    ///
    /// # Errors
    /// `CacheError::Configuration` for an unrecognized identifier.
    pub fn compress_alg(&self) -> Result<CompressAlg> {
        match &self.compression {
            Some(name) => name.parse(),
            None => Ok(CompressAlg::None),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_items: 1000,
            default_ttl: 300,
            reap_interval_ms: 1000,
            compression: None,
            namespace: String::new(),
            server_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_items, 1000);
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.reap_interval_ms, 1000);
        assert!(config.compression.is_none());
        assert!(config.namespace.is_empty());
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "MAX_ITEMS",
            "DEFAULT_TTL",
            "REAP_INTERVAL_MS",
            "CACHE_COMPRESSION",
            "CACHE_NAMESPACE",
            "SERVER_PORT",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.max_items, 1000);
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.reap_interval_ms, 1000);
        assert!(config.compression.is_none());
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_config_accessors() {
        let config = Config {
            default_ttl: 0,
            reap_interval_ms: 0,
            compression: Some("zlib".to_string()),
            ..Config::default()
        };

        assert_eq!(config.default_ttl(), Ttl::Never);
        assert_eq!(config.reap_interval(), Duration::from_millis(1));
        assert_eq!(config.compress_alg().unwrap(), CompressAlg::Zlib);
        assert_eq!(
            Config::default().default_ttl(),
            Ttl::After(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_config_unknown_compression() {
        let config = Config {
            compression: Some("abc".to_string()),
            ..Config::default()
        };
        assert!(config.compress_alg().is_err());
    }
}
