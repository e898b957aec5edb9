//! The upstream symbol server.
//!
//! [`Origin`] is the seam the request pipeline fetches through; [`HttpOrigin`]
//! implements it with `reqwest`, resolving redirects before the pipeline
//! ever sees a status.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use thiserror::Error;
use tracing::debug;

use crate::http::{BodyError, BodyStream, Headers, Method, StatusCode};

/// User agent sent upstream.
pub const USER_AGENT: &str = concat!("symproxy/", env!("CARGO_PKG_VERSION"));

/// Transport-level failures talking to the origin.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with unusable status {status}")]
    InvalidStatus { url: String, status: u16 },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

/// An upstream response after redirects have been followed.
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: Headers,
    /// The declared `Content-Length`, if any.
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl std::fmt::Debug for OriginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Something artifacts can be fetched from.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Issues one `method` request for `path` (which starts with `/`).
    async fn fetch(&self, method: &Method, path: &str) -> Result<OriginResponse, OriginError>;
}

/// Tuning for [`HttpOrigin`].
#[derive(Debug, Clone)]
pub struct OriginOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for OriginOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
        }
    }
}

/// An [`Origin`] reached over HTTP(S) at `{base}{path}`.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base: String,
}

impl HttpOrigin {
    /// Builds a client for `base`, e.g. `https://msdl.microsoft.com/download/symbols`.
    ///
    /// # Errors
    ///
    /// [`OriginError::Client`] if the TLS backend cannot be initialised.
    pub fn new(base: impl Into<String>, options: &OriginOptions) -> Result<Self, OriginError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(OriginError::Client)?;
        let base = base.into().trim_end_matches('/').to_owned();
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn classify(url: &str, source: reqwest::Error) -> OriginError {
    let url = url.to_owned();
    if source.is_timeout() {
        OriginError::Timeout { url }
    } else if source.is_connect() {
        OriginError::Connect { url, source }
    } else {
        OriginError::Request { url, source }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, method: &Method, path: &str) -> Result<OriginResponse, OriginError> {
        let url = self.url_for(path);
        let upstream_method = match method {
            Method::Head => reqwest::Method::HEAD,
            _ => reqwest::Method::GET,
        };

        debug!(%url, method = %upstream_method, "fetching from origin");
        let response = self
            .client
            .request(upstream_method, &url)
            // Bodies are relayed and stored byte for byte; keep them unencoded.
            .header(reqwest::header::ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|e| classify(&url, e))?;

        let code = response.status().as_u16();
        let status = StatusCode::from_u16(code).ok_or_else(|| OriginError::InvalidStatus {
            url: url.clone(),
            status: code,
        })?;

        let mut headers = Headers::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response.bytes_stream().map_err(BodyError::new);

        Ok(OriginResponse {
            status,
            headers,
            content_length,
            body: Box::pin(body),
        })
    }
}
