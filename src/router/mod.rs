//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! This module provides [`Router`], which dispatches incoming HTTP requests to handler
//! functions based on the request method and URL path. Two pattern styles are supported:
//!
//! | Pattern      | Example match                 |
//! |--------------|-------------------------------|
//! | `/health`    | `/health` only                |
//! | `/*`         | `/ntdll.pdb/1A2B/ntdll.pdb`   |
//!
//! Exact patterns compare the whole path byte for byte, so `/health/` does not match
//! `/health`.
//!
//! Routes are matched in registration order; the first route whose method and pattern both
//! match the incoming request wins. A path that matches some pattern under a different
//! method gets `405 Method Not Allowed` with an `Allow` header; anything else gets `404`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::{Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so one handler can be registered for
/// several methods and shared across threads without copying the underlying closure.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    // Matches one exact path string, e.g. `/health`.
    Exact(String),
    // Matches any path that starts with the given prefix, e.g. `/*`.
    Wildcard(String),
}

impl Pattern {
    /// Parse a route pattern string: a trailing `/*` makes it a [`Pattern::Wildcard`]
    /// over the preceding prefix, anything else is [`Pattern::Exact`].
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("/*") {
            Some(prefix) => Pattern::Wildcard(prefix.to_string()),
            None => Pattern::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Exact(p) => p == path,
            Pattern::Wildcard(prefix) => path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// # Examples
///
/// ```rust,no_run
/// use symproxy::{Method, Router, Response, StatusCode, context::Context};
///
/// let mut router = Router::new();
///
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::OK) });
/// router.on(&[Method::Get, Method::Head], "/*", |ctx: Context| async move {
///     let path = ctx.request().path().to_owned();
///     Response::new(StatusCode::OK).body(path)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.on(&[Method::Get], path, handler);
    }

    /// Register one handler for every method in `methods` on `path`.
    pub fn on(&mut self, methods: &[Method], path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        let pattern = Pattern::parse(path);
        for method in methods {
            self.routes.push(Route {
                method: method.clone(),
                pattern: pattern.clone(),
                handler: Arc::clone(&handler),
            });
        }
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` to the first matching route and return its response.
    pub async fn route(&self, request: Request) -> Response {
        let mut allowed: Vec<&str> = Vec::new();

        for route in &self.routes {
            if !route.pattern.matches(request.path()) {
                continue;
            }
            if &route.method == request.method() {
                return (route.handler)(Context::new(request)).await;
            }
            if !allowed.contains(&route.method.as_str()) {
                allowed.push(route.method.as_str());
            }
        }

        if allowed.is_empty() {
            Response::new(StatusCode::NOT_FOUND).body("Not found")
        } else {
            Response::new(StatusCode::METHOD_NOT_ALLOWED)
                .header("Allow", allowed.join(", "))
                .body("Method not allowed")
        }
    }
}
