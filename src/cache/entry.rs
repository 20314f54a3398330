//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use crate::codec::CompressAlg;

// == Payload ==
/// How a value is held in memory.
///
/// Compressed entries carry the algorithm they were written with, so a later
/// change of the store's compression setting cannot misread them.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<M> {
    Plain(M),
    Compressed { alg: CompressAlg, bytes: Vec<u8> },
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct Entry<M> {
    /// The stored value
    pub payload: Payload<M>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Insertion generation, matched against the FIFO tracker
    pub seq: u64,
}

impl<M> Entry<M> {
    // == Constructor ==
    pub fn new(payload: Payload<M>, expires_at: Option<u64>, seq: u64) -> Self {
        Self {
            payload,
            expires_at,
            seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `now_ms` reaches its expiration time, so a
    /// zero TTL produces an entry that is never readable.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }
}
