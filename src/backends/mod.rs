//! Backend Adapters
//!
//! External stores behind the same [`Store`](crate::store::Store) contract as
//! the memory store. Each adapter sits behind a cargo feature:
//!
//! - `redis` - [`RedisStore`], native TTL
//! - `memcache` - [`MemcacheStore`], native TTL in seconds
//! - `sqlite` - [`SqliteStore`], expiry column plus its own reaper
//! - `rocksdb` - [`RocksStore`], expiry framed into the value
//!
//! Values are written with [`codec::encode`](crate::codec::encode) and read
//! with [`codec::decode_value`](crate::codec::decode_value).

use crate::error::{CacheError, Result};

#[cfg(feature = "memcache")]
mod memcache;
#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "rocksdb")]
mod rocksdb;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "memcache")]
pub use self::memcache::MemcacheStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksStore;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteStore;

// == Expiry Framing ==
/// Size of the big-endian expiry header.
pub const EXPIRY_HEADER_LEN: usize = 8;

/// Prefixes `payload` with its expiry in unix milliseconds, 0 meaning never.
///
/// An expiry of exactly 0 is written as 1 so it stays distinguishable from
/// "never"; both are in the past for any real clock.
pub fn frame(expires_at: Option<u64>, payload: &[u8]) -> Vec<u8> {
    let header = match expires_at {
        Some(at) => at.max(1),
        None => 0,
    };

    let mut framed = Vec::with_capacity(EXPIRY_HEADER_LEN + payload.len());
    framed.extend_from_slice(&header.to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Splits a framed value into its expiry and payload.
///
/// # Errors
/// `CacheError::Backend` when the value is shorter than the header.
pub fn unframe(framed: &[u8]) -> Result<(Option<u64>, &[u8])> {
    if framed.len() < EXPIRY_HEADER_LEN {
        return Err(CacheError::backend(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("malformed value: {} bytes, expected at least {}", framed.len(), EXPIRY_HEADER_LEN),
        )));
    }

    let (header, payload) = framed.split_at(EXPIRY_HEADER_LEN);
    let mut raw = [0u8; EXPIRY_HEADER_LEN];
    raw.copy_from_slice(header);

    let expires_at = match u64::from_be_bytes(raw) {
        0 => None,
        at => Some(at),
    };
    Ok((expires_at, payload))
}

/// True once `now_ms` has reached `expires_at`.
pub fn is_expired(expires_at: Option<u64>, now_ms: u64) -> bool {
    expires_at.is_some_and(|at| now_ms >= at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let framed = frame(Some(0x0102), b"abc");
        assert_eq!(&framed[..8], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&framed[8..], b"abc");
    }

    #[test]
    fn test_unframe_restores_expiry() {
        let framed = frame(Some(1_700_000_000_000), b"{\"name\":\"John\"}");
        let (expires_at, payload) = unframe(&framed).unwrap();
        assert_eq!(expires_at, Some(1_700_000_000_000));
        assert_eq!(payload, b"{\"name\":\"John\"}");
    }

    #[test]
    fn test_never_expiring_frame() {
        let framed = frame(None, b"v");
        let (expires_at, _) = unframe(&framed).unwrap();
        assert_eq!(expires_at, None);
        assert!(!is_expired(expires_at, u64::MAX));
    }

    #[test]
    fn test_zero_expiry_is_not_never() {
        let (expires_at, _) = unframe(&frame(Some(0), b"v")).unwrap();
        assert_eq!(expires_at, Some(1));
        assert!(is_expired(expires_at, 1));
    }

    #[test]
    fn test_short_value_is_malformed() {
        let err = unframe(b"1234567").unwrap_err();
        assert!(matches!(err, CacheError::Backend(_)));
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_is_expired_boundary() {
        assert!(!is_expired(Some(1_000), 999));
        assert!(is_expired(Some(1_000), 1_000));
    }
}
