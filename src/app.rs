//! Wiring the pipeline and the liveness endpoint into a servable stack.

use std::sync::Arc;

use crate::context::Context;
use crate::health::Health;
use crate::middleware::{LoggerMiddleware, Stack};
use crate::pipeline::Pipeline;
use crate::{Method, Router};

/// Routes `/` and `/health` to the liveness payload and every other path to
/// `pipeline`, behind an access logger.
pub fn build(pipeline: Arc<Pipeline>) -> Stack {
    let read = [Method::Get, Method::Head];
    let mut router = Router::new();

    for path in ["/", "/health"] {
        let pipeline = Arc::clone(&pipeline);
        router.on(&read, path, move |_ctx: Context| {
            let stats = pipeline.persist_stats();
            async move { Health::now(stats).into_response() }
        });
    }

    router.on(&read, "/*", move |ctx: Context| {
        let pipeline = Arc::clone(&pipeline);
        async move {
            let request = ctx.into_request();
            pipeline.handle(request.method(), request.path()).await
        }
    });

    Stack::new(router).layer(LoggerMiddleware)
}
