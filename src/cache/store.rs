//! The storage contract the proxy caches into.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::SymbolKey;
use crate::http::{Body, StatusCode};

/// A complete upstream response body, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// The upstream status the body was served with (`200` or `404`).
    pub status: StatusCode,
    pub body: Bytes,
}

/// A live entry read back from a store.
#[derive(Debug)]
pub struct StoredEntry {
    pub status: StatusCode,
    pub body: Body,
}

/// Errors raised by a [`CacheStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache I/O failed for {key}: {source}")]
    Io {
        key: SymbolKey,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry for {key} is corrupt: {reason}")]
    Corrupt { key: SymbolKey, reason: String },

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// A key-value byte store with per-entry expiry.
///
/// Implementations provide atomic per-key `get`/`put`; concurrent `put`s to
/// the same key resolve as last-write-wins. The proxy performs no locking of
/// its own.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live entry for `key`, or `None` if absent or expired.
    async fn get(&self, key: &SymbolKey) -> Result<Option<StoredEntry>, StoreError>;

    /// Stores `artifact` under `key`, replacing any previous entry, expiring
    /// after `ttl`.
    async fn put(
        &self,
        key: &SymbolKey,
        artifact: CachedArtifact,
        ttl: Duration,
    ) -> Result<(), StoreError>;
}
