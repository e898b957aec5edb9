//! The read-through request pipeline.
//!
//! ```text
//! request ─▶ store.get ─hit─▶ stored body (X-Cache: HIT)
//!               │
//!              miss
//!               ▼
//!          origin.fetch ─transport error─▶ 502
//!               │
//!        policy.decide(method, status)
//!               │
//!   ┌───────────┴────────────┐
//! DoNotCache            CacheShort / CacheLong
//!   │                        │
//! pass through          split(body) ─▶ branch A to the client (X-Cache: MISS)
//!                            └──────▶ branch B to a background persist task
//! ```
//!
//! The client response is returned as soon as the upstream head arrives; the
//! cache write happens on the supervisor's time and cannot affect it.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{
    CachePolicy, CacheStore, Decision, PersistJob, PersistStats, PersistSupervisor, StoredEntry,
    SymbolKey, splitter,
};
use crate::http::{Method, Response, StatusCode};
use crate::origin::{Origin, OriginError, OriginResponse};

/// Marker header telling clients whether the store answered.
pub const CACHE_HEADER: &str = "X-Cache";

/// Errors that become client-facing responses.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("upstream unavailable: {0}")]
    Transport(#[from] OriginError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn into_response(self) -> Response {
        let response = Response::new(self.status()).header("Cache-Control", "no-store");
        match self {
            Self::MethodNotAllowed(_) => response
                .header("Allow", "GET, HEAD")
                .body("Method not allowed"),
            Self::Transport(e) => response.body(format!("Bad Gateway: {e}")),
        }
    }
}

/// Size limits for the miss path.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Largest body, in bytes, that will be written to the store.
    pub max_artifact_size: u64,
    /// How many chunks the client and cache branches may drift apart by.
    pub split_window: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_artifact_size: 25 * 1024 * 1024,
            split_window: 16,
        }
    }
}

/// Serves artifacts from a [`CacheStore`], filling it from an [`Origin`].
pub struct Pipeline {
    store: Arc<dyn CacheStore>,
    origin: Arc<dyn Origin>,
    policy: CachePolicy,
    limits: Limits,
    persist: PersistSupervisor,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn CacheStore>,
        origin: Arc<dyn Origin>,
        policy: CachePolicy,
        limits: Limits,
        persist: PersistSupervisor,
    ) -> Self {
        Self {
            store,
            origin,
            policy,
            limits,
            persist,
        }
    }

    pub fn persist_stats(&self) -> PersistStats {
        self.persist.stats()
    }

    /// Resolves once every scheduled cache write has finished.
    pub async fn wait_idle(&self) {
        self.persist.wait_idle().await;
    }

    /// Answers one `GET`/`HEAD` for `path`. Every outcome is a response;
    /// failures map to `405` or `502`.
    pub async fn handle(&self, method: &Method, path: &str) -> Response {
        match self.try_handle(method, path).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%method, %path, error = %e, "request failed");
                e.into_response()
            }
        }
    }

    async fn try_handle(&self, method: &Method, path: &str) -> Result<Response, ProxyError> {
        if !matches!(method, Method::Get | Method::Head) {
            return Err(ProxyError::MethodNotAllowed(method.clone()));
        }

        let key = SymbolKey::from_path(path);
        if let Some(entry) = self.lookup(&key).await {
            info!(%key, status = entry.status.as_u16(), "cache hit");
            return Ok(self.hit_response(entry));
        }

        info!(%key, "cache miss, fetching from upstream");
        let upstream = self.origin.fetch(method, path).await?;
        let decision = self.policy.decide(method, upstream.status);
        if upstream.status != StatusCode::OK {
            info!(%key, status = upstream.status.as_u16(), ?decision, "upstream error status");
        }
        Ok(self.miss_response(key, upstream, decision))
    }

    // Store read failures degrade to a miss.
    async fn lookup(&self, key: &SymbolKey) -> Option<StoredEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn hit_response(&self, entry: StoredEntry) -> Response {
        let content_type = if entry.status == StatusCode::OK {
            "application/octet-stream"
        } else {
            "text/plain; charset=utf-8"
        };
        let mut response = Response::new(entry.status)
            .header("Content-Type", content_type)
            .body(entry.body);
        self.stamp(&mut response, "HIT");
        response
    }

    fn miss_response(&self, key: SymbolKey, upstream: OriginResponse, decision: Decision) -> Response {
        let OriginResponse {
            status,
            mut headers,
            content_length,
            body,
        } = upstream;

        headers.strip_hop_by_hop();
        headers.remove("content-encoding");
        headers.remove("content-length");
        if status != StatusCode::OK {
            headers.set("X-Upstream-Status", status.as_u16().to_string());
        }

        let mut response = Response::new(status);
        *response.headers_mut() = headers;
        self.stamp(&mut response, "MISS");

        let Some(ttl) = decision.ttl() else {
            return response.stream(body, content_length);
        };

        let max_size = self.limits.max_artifact_size;
        if content_length.is_some_and(|n| n > max_size) {
            info!(%key, ?content_length, max_size, "artifact too large to cache, streaming only");
            return response.stream(body, content_length);
        }

        let (to_client, to_store) = splitter::split(body, self.limits.split_window);
        let job = PersistJob {
            key,
            status,
            ttl,
            max_size,
        };
        debug!(key = %job.key, ?ttl, "scheduling cache write");
        self.persist.submit(Arc::clone(&self.store), job, to_store);

        response.stream(to_client, content_length)
    }

    // Headers every artifact response carries, hit or miss.
    fn stamp(&self, response: &mut Response, cache_state: &str) {
        let cache_control = self.policy.freshness(response.status()).cache_control();
        let headers = response.headers_mut();
        headers.set("Cache-Control", cache_control);
        headers.set(CACHE_HEADER, cache_state);
        headers.set("Access-Control-Allow-Origin", "*");
    }
}
