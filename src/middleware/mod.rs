//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns. The innermost layer of every chain is a [`Router`].
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`Stack`]: an ordered middleware list in front of a router.
//! - [`LoggerMiddleware`]: built-in access logger.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Router};

/// A type-erased, reference-counted middleware.
pub type MiddlewareHandler = Arc<dyn Middleware>;

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// Implementations must be `Send + Sync` because middleware is shared across Tokio
/// tasks, and must return a `Send` future.
pub trait Middleware: Send + Sync + 'static {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation. Once every middleware has run, the
/// request is dispatched to the router.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
    endpoint: Arc<Router>,
}

impl Next {
    /// Invokes the next middleware in the chain, or the router when the chain
    /// is exhausted, and returns its response.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware.handle(ctx, self).await
            }
            None => self.endpoint.route(ctx.into_request()).await,
        }
    }
}

/// An ordered middleware stack terminating in a [`Router`].
///
/// Middleware runs in the order it was added: the first one added sees the
/// request first and the response last.
///
/// # Examples
///
/// ```rust,no_run
/// use symproxy::{Router, middleware::{LoggerMiddleware, Stack}};
///
/// let stack = Stack::new(Router::new()).layer(LoggerMiddleware);
/// ```
#[derive(Clone)]
pub struct Stack {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Arc<Router>,
}

impl Stack {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Arc::from(Vec::new()),
            endpoint: Arc::new(router),
        }
    }

    /// Adds `middleware` as the innermost layer so far.
    #[must_use]
    pub fn layer(self, middleware: impl Middleware) -> Self {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(Arc::new(middleware));
        Self {
            middlewares: Arc::from(middlewares),
            endpoint: self.endpoint,
        }
    }

    /// Runs `request` through every layer and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        };
        next.run(Context::new(request)).await
    }
}

/// Built-in middleware that logs each request's method, path, status, cache
/// outcome, and duration.
///
/// Emits a single `tracing::info!` record after the downstream handler has
/// produced its response head. Body streaming time is not included.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                cache = response.headers().get("x-cache").unwrap_or("-"),
                elapsed = ?start.elapsed(),
                "request served"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::StatusCode;

    fn make_request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    struct Stamp(&'static str);

    impl Middleware for Stamp {
        fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut res = next.run(ctx).await;
                res.headers_mut().insert("X-Layer", tag);
                res
            })
        }
    }

    struct Deny(Arc<AtomicUsize>);

    impl Middleware for Deny {
        fn handle(&self, _ctx: Context, _next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Response::new(StatusCode::FORBIDDEN) })
        }
    }

    #[tokio::test]
    async fn empty_stack_dispatches_to_router() {
        let mut router = Router::new();
        router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::NO_CONTENT) });
        let res = Stack::new(router).handle(make_request("/ping")).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn layers_decorate_inner_first() {
        let mut router = Router::new();
        router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::OK) });
        let stack = Stack::new(router)
            .layer(Stamp("outer"))
            .layer(LoggerMiddleware)
            .layer(Stamp("inner"));

        let res = stack.handle(make_request("/ping")).await;
        let layers: Vec<_> = res.headers().get_all("x-layer").collect();
        assert_eq!(layers, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let hits = Arc::new(AtomicUsize::new(0));
        let routed = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        let seen = Arc::clone(&routed);
        router.get("/ping", move |_ctx: Context| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Response::new(StatusCode::OK) }
        });

        let stack = Stack::new(router).layer(Deny(Arc::clone(&hits)));
        let res = stack.handle(make_request("/ping")).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(routed.load(Ordering::SeqCst), 0);
    }
}
