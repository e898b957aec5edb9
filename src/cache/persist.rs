//! Writing fetched artifacts into the store in the background.
//!
//! [`persist`] drains one branch of a split upstream body into memory, bounded
//! by a size ceiling, and writes the result to the [`CacheStore`] only once
//! the whole body has arrived. [`PersistSupervisor`] owns every such task:
//! it spawns them into a [`JoinSet`], records how each ended, and logs
//! failures and panics so none of them reach a client or the process.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::{CacheStore, CachedArtifact, StoreError, SymbolKey};
use crate::http::{BodyError, StatusCode};

/// What to store, and under which limits.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub key: SymbolKey,
    pub status: StatusCode,
    pub ttl: Duration,
    /// Bodies larger than this many bytes are never stored.
    pub max_size: u64,
}

/// Why an artifact was not stored.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{key} exceeds the {limit} byte cache ceiling ({seen} bytes seen)")]
    Oversize {
        key: SymbolKey,
        limit: u64,
        seen: u64,
    },

    #[error("reading body for {key} failed: {source}")]
    Body {
        key: SymbolKey,
        #[source]
        source: BodyError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Accumulates `body` and stores it under `job.key`.
///
/// Returns the number of bytes written. If the running total passes
/// `job.max_size` the buffer is discarded and the stream dropped at once;
/// a partial artifact is never written.
///
/// # Errors
///
/// [`PersistError::Oversize`] when the ceiling is crossed,
/// [`PersistError::Body`] when the stream fails,
/// [`PersistError::Store`] when the write is rejected.
pub async fn persist<S>(store: &dyn CacheStore, job: PersistJob, mut body: S) -> Result<u64, PersistError>
where
    S: Stream<Item = Result<Bytes, BodyError>> + Unpin,
{
    let mut buffer = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| PersistError::Body {
            key: job.key.clone(),
            source,
        })?;
        let seen = (buffer.len() + chunk.len()) as u64;
        if seen > job.max_size {
            return Err(PersistError::Oversize {
                key: job.key,
                limit: job.max_size,
                seen,
            });
        }
        buffer.extend_from_slice(&chunk);
    }

    let size = buffer.len() as u64;
    let artifact = CachedArtifact {
        status: job.status,
        body: buffer.freeze(),
    };
    store.put(&job.key, artifact, job.ttl).await?;
    Ok(size)
}

/// Counters describing how background persists have ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub in_flight: usize,
    pub written: u64,
    /// Skipped for exceeding the size ceiling.
    pub skipped: u64,
    /// Body, store, or panic failures.
    pub failed: u64,
}

type Task = Pin<Box<dyn Future<Output = Result<u64, PersistError>> + Send>>;

struct Submitted {
    key: SymbolKey,
    task: Task,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Runs persist tasks to completion off the request path.
///
/// Cloning is cheap; all clones feed the same supervisor task, which lives
/// until the last clone is dropped and then finishes any tasks still running.
#[derive(Clone)]
pub struct PersistSupervisor {
    jobs: mpsc::UnboundedSender<Submitted>,
    in_flight: Arc<watch::Sender<usize>>,
    counters: Arc<Counters>,
}

impl PersistSupervisor {
    /// Starts the supervisor task. Must be called within a Tokio runtime.
    pub fn start() -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (in_flight, _) = watch::channel(0usize);
        let supervisor = Self {
            jobs,
            in_flight: Arc::new(in_flight),
            counters: Arc::new(Counters::default()),
        };
        tokio::spawn(supervise(
            rx,
            Arc::clone(&supervisor.in_flight),
            Arc::clone(&supervisor.counters),
        ));
        supervisor
    }

    /// Schedules `persist(store, job, body)` and returns immediately.
    ///
    /// The task is counted as in flight before this returns.
    pub fn submit<S>(&self, store: Arc<dyn CacheStore>, job: PersistJob, body: S)
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + Unpin + 'static,
    {
        let key = job.key.clone();
        let task: Task = Box::pin(async move { persist(store.as_ref(), job, body).await });

        self.in_flight.send_modify(|n| *n += 1);
        if let Err(mpsc::error::SendError(rejected)) = self.jobs.send(Submitted { key, task }) {
            error!(key = %rejected.key, "persist supervisor is gone, dropping cache write");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    pub fn stats(&self) -> PersistStats {
        PersistStats {
            in_flight: *self.in_flight.borrow(),
            written: self.counters.written.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Resolves once no persist task is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

async fn supervise(
    mut jobs: mpsc::UnboundedReceiver<Submitted>,
    in_flight: Arc<watch::Sender<usize>>,
    counters: Arc<Counters>,
) {
    let mut running: JoinSet<(SymbolKey, Result<u64, PersistError>)> = JoinSet::new();
    let mut open = true;

    while open || !running.is_empty() {
        tokio::select! {
            job = jobs.recv(), if open => match job {
                Some(Submitted { key, task }) => {
                    running.spawn(async move { (key, task.await) });
                }
                None => open = false,
            },
            Some(joined) = running.join_next() => {
                record(joined, &counters);
                in_flight.send_modify(|n| *n = n.saturating_sub(1));
            }
        }
    }

    debug!("persist supervisor stopped");
}

fn record(joined: Result<(SymbolKey, Result<u64, PersistError>), JoinError>, counters: &Counters) {
    match joined {
        Ok((key, Ok(bytes))) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
            info!(%key, bytes, "cached");
        }
        Ok((key, Err(e @ PersistError::Oversize { .. }))) => {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            info!(%key, error = %e, "artifact too large to cache");
        }
        Ok((key, Err(e))) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(%key, error = %e, "failed to cache artifact");
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, panicked = e.is_panic(), "persist task aborted");
        }
    }
}
