//! Turning arbitrary values into handlers.
//!
//! Routes and middleware accept anything implementing [`IntoHandlerValue`].
//! That conversion happens at compile time and only wraps the value into a
//! type-erased [`HandlerValue`] whose payload has a named type. At
//! registration the [`HandlerExtender`] looks the payload type up in its
//! converter table and produces the [`HandlerFunc`]s the route stores.
//!
//! | Value | Behaviour |
//! |---|---|
//! | `fn(&mut Context) -> BoxFuture<'_, ()>` | used as is |
//! | `Fn(&mut Context)` | called after the body is read |
//! | `Fn(&mut Context) -> Result<V, E>` | `Ok` renders `V` (unless `()`), `Err` fails the request |
//! | `Fn(&mut Context, T) -> Result<V, E>` | same, with `T` bound from the request |
//! | [`NativeHandler`] | `http::Request<Bytes>` in, `http::Response<Bytes>` out |
//! | `&'static str`, `String` | written as the response body |
//! | [`Error`] | fails every request with that error |
//! | `Vec<_>`, [`handlers!`](crate::handlers) | flattened |
//! | [`HandlerValue::factory`] | asked for a handler per route path |
//!
//! Anything else can be wrapped with [`HandlerValue::new`] once a converter
//! for its type is registered.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::controller::{ControllerAction, action_handler};
use crate::error::{Error, RouteError};
use crate::handler::{BoxFuture, Handler, HandlerFunc, SyncHandler, handler_func};

/// A value waiting to be converted into handlers.
pub struct HandlerValue {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl HandlerValue {
    /// Wraps any value; a converter for `T` must be registered before the
    /// value is used in a route.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self { value: Box::new(value), type_name: std::any::type_name::<T>() }
    }

    /// Wraps a value that builds its handler from the route path.
    pub fn factory(factory: impl NewHandler) -> Self {
        Self::new(Factory(Arc::new(factory)))
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    fn payload_type(&self) -> TypeId {
        Any::type_id(&*self.value)
    }
}

impl fmt::Debug for HandlerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerValue({})", self.type_name)
    }
}

/// Builds a handler for the route it is registered on.
pub trait NewHandler: Send + Sync + 'static {
    fn new_handler(&self, path: &str) -> HandlerFunc;
}

/// A handler speaking plain `http` types.
///
/// The request carries the cached body; the response replaces the status,
/// headers and body written so far.
pub trait NativeHandler: Send + Sync + 'static {
    fn serve_http(&self, req: http::Request<Bytes>) -> http::Response<Bytes>;
}

impl<F> NativeHandler for F
where
    F: Fn(http::Request<Bytes>) -> http::Response<Bytes> + Send + Sync + 'static,
{
    fn serve_http(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        (self)(req)
    }
}

/// Compile-time conversion into a [`HandlerValue`].
///
/// `M` only tells the implementations apart; callers never name it.
pub trait IntoHandlerValue<M> {
    fn into_handler_value(self) -> HandlerValue;
}

/// Markers selecting an [`IntoHandlerValue`] implementation.
pub mod shape {
    use std::marker::PhantomData;

    pub enum Value {}
    pub enum Canonical {}
    pub enum Plain {}
    pub struct Fallible<V, E>(PhantomData<fn() -> (V, E)>);
    pub struct Typed<T, V, E>(PhantomData<fn(T) -> (V, E)>);
    pub enum Native {}
    pub enum Text {}
    pub enum Failure {}
    pub struct List<M>(PhantomData<M>);
}

type CallFn = Arc<dyn Fn(&mut Context) -> Result<(), Error> + Send + Sync>;

// Payloads. Each gets one built-in converter.
struct SyncFunc(Arc<dyn Fn(&mut Context) + Send + Sync>);
struct FallibleFunc(CallFn);
struct TypedFunc(CallFn);
struct NativeFunc(Arc<dyn NativeHandler>);
struct ErrorValue(Arc<Error>);
struct Factory(Arc<dyn NewHandler>);
struct HandlerList(Vec<HandlerValue>);

impl IntoHandlerValue<shape::Value> for HandlerValue {
    fn into_handler_value(self) -> HandlerValue {
        self
    }
}

impl IntoHandlerValue<shape::Value> for HandlerFunc {
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(self)
    }
}

impl<F> IntoHandlerValue<shape::Canonical> for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(handler_func(self))
    }
}

impl<F> IntoHandlerValue<shape::Plain> for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(SyncFunc(Arc::new(self)))
    }
}

impl<F, V, E> IntoHandlerValue<shape::Fallible<V, E>> for F
where
    F: Fn(&mut Context) -> Result<V, E> + Send + Sync + 'static,
    V: Serialize + 'static,
    E: Into<Error>,
{
    fn into_handler_value(self) -> HandlerValue {
        let f = self;
        HandlerValue::new(FallibleFunc(Arc::new(move |ctx: &mut Context| {
            let value = f(ctx).map_err(Into::into)?;
            reply(ctx, &value)
        })))
    }
}

impl<F, T, V, E> IntoHandlerValue<shape::Typed<T, V, E>> for F
where
    F: Fn(&mut Context, T) -> Result<V, E> + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    V: Serialize + 'static,
    E: Into<Error>,
{
    fn into_handler_value(self) -> HandlerValue {
        let f = self;
        HandlerValue::new(TypedFunc(Arc::new(move |ctx: &mut Context| {
            let input: T = ctx.bind_cached()?;
            let value = f(ctx, input).map_err(Into::into)?;
            reply(ctx, &value)
        })))
    }
}

impl<H: NativeHandler> IntoHandlerValue<shape::Native> for H {
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(NativeFunc(Arc::new(self)))
    }
}

impl IntoHandlerValue<shape::Text> for &'static str {
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(self.to_owned())
    }
}

impl IntoHandlerValue<shape::Text> for String {
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(self)
    }
}

impl IntoHandlerValue<shape::Failure> for Error {
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(ErrorValue(Arc::new(self)))
    }
}

impl<T, M> IntoHandlerValue<shape::List<M>> for Vec<T>
where
    T: IntoHandlerValue<M>,
{
    fn into_handler_value(self) -> HandlerValue {
        HandlerValue::new(HandlerList(self.into_iter().map(<T as IntoHandlerValue<M>>::into_handler_value).collect()))
    }
}

/// Renders a handler's return value; `()` means the handler wrote its own
/// response.
pub(crate) fn reply<V: Serialize + 'static>(ctx: &mut Context, value: &V) -> Result<(), Error> {
    if TypeId::of::<V>() == TypeId::of::<()>() {
        return Ok(());
    }
    ctx.render(value)
}

/// Collects handler values of mixed shapes into one list.
///
/// ```rust
/// use torii::{handlers, Context, Router};
///
/// let mut router = Router::new();
/// router
///     .get_func("/", handlers![
///         |ctx: &mut Context| ctx.set_header("x-served-by", "torii"),
///         "hello",
///     ])
///     .unwrap();
/// ```
#[macro_export]
macro_rules! handlers {
    ($($handler:expr),* $(,)?) => {
        ::std::vec![$($crate::IntoHandlerValue::into_handler_value($handler)),*]
    };
}

/// Runs a call after the request body has been read, failing the request on
/// error.
pub(crate) struct Prepared(pub(crate) CallFn);

impl Handler for Prepared {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(err) = ctx.prepare().await {
                ctx.fatal(err);
                return;
            }
            if let Err(err) = (self.0)(ctx) {
                ctx.fatal(err);
            }
        })
    }
}

struct NativeAdapter(Arc<dyn NativeHandler>);

impl Handler for NativeAdapter {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(err) = ctx.read_body().await {
                ctx.fatal(err);
                return;
            }
            let parts = ctx.request();
            let mut req = http::Request::new(Bytes::copy_from_slice(ctx.body()));
            *req.method_mut() = parts.method.clone();
            *req.uri_mut() = parts.uri.clone();
            *req.version_mut() = parts.version;
            *req.headers_mut() = parts.headers.clone();

            let (head, body) = self.0.serve_http(req).into_parts();
            let response = ctx.response_mut();
            response.reset();
            response.headers_mut().extend(head.headers);
            response.write_header(head.status);
            response.write(&body);
        })
    }
}

struct Failing(Arc<Error>);

impl Handler for Failing {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        let err: Arc<dyn std::error::Error + Send + Sync> = self.0.clone();
        ctx.fatal(Error::Handler(err));
        Box::pin(std::future::ready(()))
    }
}

type Converter = Arc<dyn Fn(&str, &HandlerValue) -> Option<HandlerFunc> + Send + Sync>;

#[derive(Clone, Default)]
struct Scope {
    prefix: String,
    converters: HashMap<TypeId, Vec<Converter>>,
}

/// Converter registry, scoped by route path prefix.
///
/// Lookup walks this extender's scopes from the longest matching prefix to
/// the shortest, newest converter first, then falls back to the extender it
/// was forked from. A value already shaped as a [`HandlerFunc`] passes
/// through untouched when no converter claims it.
#[derive(Clone)]
pub struct HandlerExtender {
    scopes: Vec<Scope>,
    parent: Option<Arc<HandlerExtender>>,
}

impl HandlerExtender {
    /// An extender with the built-in converters.
    pub fn new() -> Self {
        let mut ext = Self::empty();
        ext.register("", |_, f: &SyncFunc| {
            let f = Arc::clone(&f.0);
            Some(handler_func(Prepared(Arc::new(move |ctx: &mut Context| {
                f(ctx);
                Ok(())
            }))))
        });
        ext.register("", |_, f: &FallibleFunc| Some(handler_func(Prepared(Arc::clone(&f.0)))));
        ext.register("", |_, f: &TypedFunc| Some(handler_func(Prepared(Arc::clone(&f.0)))));
        ext.register("", |_, f: &NativeFunc| Some(handler_func(NativeAdapter(Arc::clone(&f.0)))));
        ext.register("", |_, text: &String| {
            let text = text.clone();
            Some(handler_func(SyncHandler(move |ctx: &mut Context| ctx.write_string(&text))))
        });
        ext.register("", |_, err: &ErrorValue| Some(handler_func(Failing(Arc::clone(&err.0)))));
        ext.register("", |path, f: &Factory| Some(f.0.new_handler(path)));
        ext.register("", |_, action: &ControllerAction| Some(action_handler(action)));
        ext
    }

    /// An extender with no converters; only handler passthrough works.
    pub fn empty() -> Self {
        Self { scopes: Vec::new(), parent: None }
    }

    /// A child extender that sees this one's converters as they are now.
    /// Registrations on the child never reach this extender.
    pub fn fork(&self) -> Self {
        Self { scopes: Vec::new(), parent: Some(Arc::new(self.clone())) }
    }

    /// Adds a converter for `T`, usable by routes under `prefix` (`""` for
    /// every route). Returning `None` passes the value on to older or
    /// wider-scoped converters.
    pub fn register<T, F>(&mut self, prefix: &str, convert: F)
    where
        T: Any,
        F: Fn(&str, &T) -> Option<HandlerFunc> + Send + Sync + 'static,
    {
        let converter: Converter =
            Arc::new(move |path: &str, value: &HandlerValue| convert(path, value.downcast_ref::<T>()?));
        let scope = match self.scopes.iter().position(|s| s.prefix == prefix) {
            Some(i) => &mut self.scopes[i],
            None => {
                self.scopes.push(Scope { prefix: prefix.to_owned(), converters: HashMap::new() });
                let last = self.scopes.len() - 1;
                &mut self.scopes[last]
            }
        };
        scope.converters.entry(TypeId::of::<T>()).or_default().push(converter);
    }

    /// Converts `value` into the handlers registered on `path`.
    pub fn new_handler_funcs(&self, path: &str, value: &HandlerValue) -> Result<Vec<HandlerFunc>, RouteError> {
        // Lists flatten first so each item gets the full converter lookup.
        if let Some(list) = value.downcast_ref::<HandlerList>() {
            let mut out = Vec::with_capacity(list.0.len());
            for item in &list.0 {
                out.extend(self.new_handler_funcs(path, item)?);
            }
            return Ok(out);
        }
        if let Some(handler) = self.convert(path, value) {
            return Ok(vec![handler]);
        }
        // Already a handler and nothing claimed it: use it as is.
        if let Some(handler) = value.downcast_ref::<HandlerFunc>() {
            return Ok(vec![Arc::clone(handler)]);
        }
        Err(RouteError::NoConverter { path: path.to_owned(), type_name: value.type_name().to_owned() })
    }

    fn convert(&self, path: &str, value: &HandlerValue) -> Option<HandlerFunc> {
        let id = value.payload_type();
        let mut scopes: Vec<&Scope> = self.scopes.iter().filter(|s| path.starts_with(s.prefix.as_str())).collect();
        // Most specific prefix first; `""` (unscoped) sorts last.
        scopes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        for scope in scopes {
            let Some(converters) = scope.converters.get(&id) else {
                continue;
            };
            // Later registrations shadow earlier ones; a converter returning
            // `None` passes the value on to the next.
            if let Some(handler) = converters.iter().rev().find_map(|c| c(path, value)) {
                return Some(handler);
            }
        }
        // Nothing here: fall back to what the group inherited at fork time.
        self.parent.as_ref()?.convert(path, value)
    }
}

impl Default for HandlerExtender {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerExtender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes: Vec<&str> = self.scopes.iter().map(|s| s.prefix.as_str()).collect();
        f.debug_struct("HandlerExtender")
            .field("scopes", &prefixes)
            .field("forked", &self.parent.is_some())
            .finish()
    }
}
