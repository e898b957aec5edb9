//! Response bodies: either fully buffered bytes or a stream of chunks.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};

/// A failure while producing body chunks.
///
/// Cloneable so that a single upstream read error can be delivered to every
/// consumer of a split stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyError(Arc<str>);

impl BodyError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string().into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BodyError {}

impl From<std::io::Error> for BodyError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err)
    }
}

/// A boxed, sendable stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send>>;

/// The payload of a [`Response`](super::Response).
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    /// Chunks produced incrementally; `length` is the declared total size when
    /// known up front.
    Stream {
        stream: BodyStream,
        length: Option<u64>,
    },
}

impl Body {
    /// Wraps any chunk stream as a body.
    pub fn from_stream<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Self::Stream {
            stream: Box::pin(stream),
            length,
        }
    }

    /// Returns the body length when it is known without draining the body.
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Full(bytes) => Some(bytes.len() as u64),
            Self::Stream { length, .. } => *length,
        }
    }

    /// Returns `true` if the body is known to contain no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Converts the body into a chunk stream regardless of its representation.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Self::Empty => Box::pin(stream::empty()),
            Self::Full(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            Self::Stream { stream, .. } => stream,
        }
    }

    /// Drains the body into a single buffer.
    pub async fn collect(self) -> Result<Bytes, BodyError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Stream { mut stream, length } => {
                let capacity = length.unwrap_or(0).min(1 << 20) as usize;
                let mut buf = BytesMut::with_capacity(capacity);
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Self::Stream { length, .. } => f
                .debug_struct("Body::Stream")
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Full(bytes)
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Bytes::from(v).into()
    }
}
