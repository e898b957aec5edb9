//! In-process cache store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::{CacheStore, CachedArtifact, StoreError, StoredEntry, SymbolKey};
use crate::http::Body;

struct Entry {
    artifact: CachedArtifact,
    expires_at: Instant,
}

/// A [`CacheStore`] held in memory, lost on restart.
///
/// Expired entries are invisible to `get`. They are dropped on access, by
/// [`purge_expired`](Self::purge_expired), or periodically by the task
/// [`spawn_purger`](Self::spawn_purger) starts.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<SymbolKey, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw artifact for `key` if it is still live.
    pub fn peek(&self, key: &SymbolKey) -> Option<CachedArtifact> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.artifact.clone())
    }

    /// Time left before the entry for `key` expires.
    pub fn remaining_ttl(&self, key: &SymbolKey) -> Option<Duration> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Starts a task calling [`purge_expired`](Self::purge_expired) every
    /// `every`, so entries for keys that are never requested again are still
    /// reclaimed. The task ends once the store is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `every` is zero.
    pub fn spawn_purger(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = store.len(), "purged expired cache entries");
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &SymbolKey) -> Result<Option<StoredEntry>, StoreError> {
        match self.peek(key) {
            Some(artifact) => Ok(Some(StoredEntry {
                status: artifact.status,
                body: Body::from(artifact.body),
            })),
            None => {
                let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                if entries
                    .get(key)
                    .is_some_and(|entry| entry.expires_at <= Instant::now())
                {
                    entries.remove(key);
                }
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        key: &SymbolKey,
        artifact: CachedArtifact,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            artifact,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), entry);
        Ok(())
    }
}
