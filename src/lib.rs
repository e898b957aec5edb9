//! # symproxy
//!
//! A read-through caching reverse proxy for a Microsoft-style symbol server.
//!
//! Debuggers ask for `GET /{pdb_name}/{guid}/{filename}`. The first request
//! for an artifact is fetched from the upstream symbol server and streamed
//! to the client while a second copy of the same byte stream is written to
//! the cache in the background. Later requests are answered from the cache
//! without contacting upstream.
//!
//! ## Layout
//!
//! - [`http`], [`server`]: HTTP/1.1 wire types and the connection loop.
//! - [`router`], [`context`], [`middleware`]: dispatch to handlers.
//! - [`cache`]: keys, policy, stores, the stream splitter, and background persists.
//! - [`origin`]: the upstream client.
//! - [`pipeline`]: the cache-aside request path tying the above together.
//! - [`health`], [`app`], [`config`]: process wiring.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use symproxy::cache::{CachePolicy, MemoryStore, PersistSupervisor};
//! use symproxy::origin::{HttpOrigin, OriginOptions};
//! use symproxy::pipeline::{Limits, Pipeline};
//! use symproxy::{Server, app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let origin = HttpOrigin::new(
//!         "https://msdl.microsoft.com/download/symbols",
//!         &OriginOptions::default(),
//!     )?;
//!     let pipeline = Pipeline::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(origin),
//!         CachePolicy::default(),
//!         Limits::default(),
//!         PersistSupervisor::start(),
//!     );
//!     let stack = app::build(Arc::new(pipeline));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |request| {
//!             let stack = stack.clone();
//!             async move { stack.handle(request).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod context;
pub mod health;
pub mod http;
pub mod middleware;
pub mod origin;
pub mod pipeline;
pub mod router;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
