use std::time::Duration;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerFunc, handler_func};

struct Timeout(Duration);

impl Handler for Timeout {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        let token = ctx.get_context().with_timeout(self.0);
        ctx.with_context(token);
        Box::pin(std::future::ready(()))
    }
}

/// Gives later handlers a deadline `limit` from now.
///
/// Only the context's [`CancelToken`](crate::CancelToken) changes: handlers
/// that race their I/O against it stop early, nothing is interrupted by force.
pub fn timeout(limit: Duration) -> HandlerFunc {
    handler_func(Timeout(limit))
}
