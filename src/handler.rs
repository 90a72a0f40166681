//! The canonical handler signature and handler chains.
//!
//! # How handlers are stored
//!
//! Every route resolves to a flat [`HandlerChain`]: global middleware, scoped
//! middleware and the route's own handlers, concatenated once at registration
//! time. Each element is a [`HandlerFunc`], an `Arc<dyn Handler>`, so chains of
//! differently-typed handlers live in one slice and can be shared by every
//! request that hits the route.
//!
//! ```text
//! fn auth(ctx: &mut Context) -> BoxFuture<'_, ()> { … }   ← user writes this
//!        ↓ router.add_middleware(auth)
//! HandlerExtender::new_handler_funcs                      ← registration time
//!        ↓
//! Arc<dyn Handler>  stored in Arc<[HandlerFunc]>          ← one chain per route
//!        ↓
//! ctx.next().await  at request time                       ← cursor walks the chain
//! ```
//!
//! A handler receives the request [`Context`] and decides whether to descend
//! with [`Context::next`] (wrapping the rest of the chain) or stop everything
//! with [`Context::end`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;

/// A heap-allocated, type-erased future borrowed from the request context.
///
/// `Send` lets tokio move the request task between worker threads; the
/// borrow of the [`Context`] is what keeps handlers strictly sequential.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The canonical handler: takes the request context, returns when done.
///
/// Implemented for every `fn(&mut Context) -> BoxFuture<'_, ()>`. Other
/// shapes (sync closures, typed handlers, strings, ...) are adapted to it by
/// the [`HandlerExtender`](crate::HandlerExtender) at registration time.
///
/// ```rust
/// use torii::{BoxFuture, Context};
///
/// fn timing(ctx: &mut Context) -> BoxFuture<'_, ()> {
///     Box::pin(async move {
///         let start = std::time::Instant::now();
///         ctx.next().await;
///         ctx.with_field("elapsed_us", start.elapsed().as_micros()).debug("done");
///     })
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (self)(ctx)
    }
}

/// A shared, type-erased handler.
pub type HandlerFunc = Arc<dyn Handler>;

/// A flat, shared handler sequence executed under one cursor.
pub type HandlerChain = Arc<[HandlerFunc]>;

/// Wraps any [`Handler`] into a [`HandlerFunc`].
pub fn handler_func(handler: impl Handler) -> HandlerFunc {
    Arc::new(handler)
}

/// Builds a chain from owned handlers.
pub fn chain(handlers: Vec<HandlerFunc>) -> HandlerChain {
    handlers.into()
}

/// Concatenates chains into a fresh one; the inputs are left untouched.
pub fn combine(parts: &[&[HandlerFunc]]) -> HandlerChain {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut out = Vec::with_capacity(len);
    for part in parts {
        out.extend(part.iter().cloned());
    }
    out.into()
}

/// Adapts a synchronous closure into a [`Handler`] future.
pub(crate) struct SyncHandler<F>(pub(crate) F);

impl<F> Handler for SyncHandler<F>
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (self.0)(ctx);
        Box::pin(std::future::ready(()))
    }
}

/// Writes `404 page not found`. The default not-found chain.
pub fn not_found(ctx: &mut Context) -> BoxFuture<'_, ()> {
    ctx.write_header(http::StatusCode::NOT_FOUND);
    ctx.write_string("404 page not found");
    Box::pin(std::future::ready(()))
}

/// Writes `405 method not allowed`. The default method-not-allowed chain.
pub fn method_not_allowed(ctx: &mut Context) -> BoxFuture<'_, ()> {
    ctx.write_header(http::StatusCode::METHOD_NOT_ALLOWED);
    ctx.write_string("405 method not allowed");
    Box::pin(std::future::ready(()))
}
