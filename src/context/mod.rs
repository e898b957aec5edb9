//! Per-request context handed to route handlers and middleware.

use crate::Request;

/// A request on its way through the middleware stack to a route handler.
#[derive(Debug)]
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}
