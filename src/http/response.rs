//! HTTP/1.1 response builder and wire writer.
//!
//! Provides a fluent builder API for constructing HTTP responses and
//! writing them to a socket, streaming the body chunk by chunk.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Body, BodyError, Headers, StatusCode};

/// How a response should be framed on the wire.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Write only the status line and headers (responses to `HEAD`).
    pub head_only: bool,
    /// Whether the peer understands `Transfer-Encoding: chunked` (HTTP/1.1).
    pub allow_chunked: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            head_only: false,
            allow_chunked: true,
        }
    }
}

/// An HTTP/1.1 response, ready to be written to a client.
///
/// # Examples
///
/// ```
/// use symproxy::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Empty,
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body.
    ///
    /// Framing headers are written automatically by [`write_to`](Self::write_to).
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a streaming response body with an optional declared length.
    #[must_use]
    pub fn stream<S>(mut self, stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        self.body = Body::from_stream(stream, length);
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Consumes the response, returning its body.
    pub fn into_body(self) -> Body {
        self.body
    }

    // 1xx, 204 and 304 never carry a body.
    fn forbids_body(&self) -> bool {
        let code = self.status.as_u16();
        code < 200 || code == 204 || code == 304
    }

    /// Writes the response to `writer` in HTTP/1.1 wire format.
    ///
    /// Framing is chosen from the body:
    /// - a known length is sent with `Content-Length`;
    /// - an unknown length uses `Transfer-Encoding: chunked`, or when the
    ///   peer cannot decode chunks, an unframed body terminated by closing the
    ///   connection.
    ///
    /// `Content-Type: text/plain; charset=utf-8` is added to buffered bodies
    /// that have no content type.
    ///
    /// Returns whether the connection may be reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the writer fails, if the body stream fails, or
    /// if the stream yields a different number of bytes than it declared. In
    /// all of those cases the connection must be closed.
    pub async fn write_to<W>(mut self, writer: &mut W, options: WriteOptions) -> io::Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        let length = self.body.len();
        let no_body = self.forbids_body();
        let chunked = length.is_none() && options.allow_chunked && !no_body;
        let close_delimited = length.is_none() && !options.allow_chunked && !no_body;
        let keep_alive = self.keep_alive && !(close_delimited && !options.head_only);

        if matches!(self.body, Body::Full(_)) && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        self.headers.remove("content-length");
        self.headers.remove("transfer-encoding");
        self.headers
            .set("Connection", if keep_alive { "keep-alive" } else { "close" });

        let mut head = BytesMut::with_capacity(128 + self.headers.len() * 64);
        head.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        head.put(self.headers.to_string().as_bytes());
        if let Some(n) = length.filter(|_| !no_body) {
            head.put(format!("Content-Length: {n}\r\n").as_bytes());
        } else if chunked && !options.head_only {
            head.put(&b"Transfer-Encoding: chunked\r\n"[..]);
        }
        head.put(&b"\r\n"[..]);
        writer.write_all(&head).await?;

        if options.head_only || no_body {
            writer.flush().await?;
            return Ok(keep_alive);
        }

        let mut stream = self.body.into_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(io::Error::other)?;
            if chunk.is_empty() {
                continue;
            }
            written += chunk.len() as u64;
            if chunked {
                writer
                    .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                    .await?;
                writer.write_all(&chunk).await?;
                writer.write_all(b"\r\n").await?;
            } else {
                if length.is_some_and(|n| written > n) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "body longer than declared Content-Length",
                    ));
                }
                writer.write_all(&chunk).await?;
            }
        }

        if chunked {
            writer.write_all(b"0\r\n\r\n").await?;
        } else if let Some(n) = length.filter(|&n| written != n) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended after {written} of {n} declared bytes"),
            ));
        }

        writer.flush().await?;
        Ok(keep_alive)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
