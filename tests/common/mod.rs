#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use symproxy::cache::{CachePolicy, CacheStore, MemoryStore, PersistSupervisor};
use symproxy::http::{BodyError, Headers, Method, StatusCode};
use symproxy::origin::{Origin, OriginError, OriginResponse};
use symproxy::pipeline::{Limits, Pipeline};

pub const LONG_TTL: Duration = Duration::from_secs(31_536_000);
pub const SHORT_TTL: Duration = Duration::from_secs(3_600);

/// What the fake origin answers for one path.
#[derive(Clone)]
pub enum Reply {
    Status {
        status: StatusCode,
        chunks: Vec<Result<Bytes, BodyError>>,
        declare_length: bool,
        headers: Vec<(&'static str, &'static str)>,
    },
    Unreachable,
}

impl Reply {
    pub fn ok(body: &'static [u8]) -> Self {
        Self::status(StatusCode::OK, body)
    }

    pub fn status(status: StatusCode, body: &'static [u8]) -> Self {
        Self::Status {
            status,
            chunks: vec![Ok(Bytes::from_static(body))],
            declare_length: true,
            headers: Vec::new(),
        }
    }

    /// `body` cut into `chunk`-sized pieces with no declared length.
    pub fn chunked(body: Vec<u8>, chunk: usize) -> Self {
        Self::Status {
            status: StatusCode::OK,
            chunks: body.chunks(chunk).map(|c| Ok(Bytes::copy_from_slice(c))).collect(),
            declare_length: false,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        if let Self::Status { headers, .. } = &mut self {
            headers.push((name, value));
        }
        self
    }
}

/// An in-memory [`Origin`] that records every call it receives.
#[derive(Default)]
pub struct FakeOrigin {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    methods: Mutex<Vec<Method>>,
}

impl FakeOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, path: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(path.to_owned(), reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<Method> {
        self.methods.lock().unwrap().clone()
    }
}

#[async_trait]
impl Origin for FakeOrigin {
    async fn fetch(&self, method: &Method, path: &str) -> Result<OriginResponse, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().unwrap().push(method.clone());

        let reply = self.replies.lock().unwrap().get(path).cloned();
        let (status, chunks, declare_length, extra) = match reply {
            Some(Reply::Status {
                status,
                chunks,
                declare_length,
                headers,
            }) => (status, chunks, declare_length, headers),
            Some(Reply::Unreachable) => {
                return Err(OriginError::Timeout {
                    url: format!("http://origin.test{path}"),
                });
            }
            None => (StatusCode::NOT_FOUND, vec![Ok(Bytes::from_static(b"not found"))], true, Vec::new()),
        };

        let length: u64 = chunks
            .iter()
            .map(|c| c.as_ref().map_or(0, |b| b.len() as u64))
            .sum();
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/octet-stream");
        if declare_length {
            headers.insert("Content-Length", length.to_string());
        }
        for (name, value) in extra {
            headers.insert(name, value);
        }

        let body = if *method == Method::Head { Vec::new() } else { chunks };
        Ok(OriginResponse {
            status,
            headers,
            content_length: declare_length.then_some(length),
            body: Box::pin(stream::iter(body)),
        })
    }
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub origin: Arc<FakeOrigin>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        let origin = Arc::new(FakeOrigin::new());
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::clone(&origin) as Arc<dyn Origin>,
            CachePolicy::new(LONG_TTL, SHORT_TTL),
            limits,
            PersistSupervisor::start(),
        );
        Self {
            pipeline: Arc::new(pipeline),
            origin,
            store,
        }
    }
}
