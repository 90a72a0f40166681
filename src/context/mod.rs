//! The per-request context.
//!
//! A [`Context`] is borrowed from the [`ContextPool`](crate::ContextPool) for
//! exactly one request. It owns the request head and lazily-read body, the
//! buffered response, the parameter store and the handler cursor.
//!
//! # The handler cursor
//!
//! The cursor is an `(index, chain)` pair that starts at `(-1, chain)`.
//! [`Context::next`] advances it and runs handlers until the index passes the
//! end of the chain. A middleware that awaits `next()` wraps everything after
//! it; one that does not simply returns and the loop carries on with the next
//! handler. [`Context::end`] moves the index to the end so nothing else runs.

mod bind;
mod log;

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap};
use http::{StatusCode, Uri};
use http_body_util::Full;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::handler::{HandlerChain, HandlerFunc};
use crate::params::Params;
use crate::request::{Body, Cookie, Form, FormFile, RequestState};
use crate::response::{ContentType, ResponseWriter, SetCookie};

pub use bind::{Binder, Renderer, Validate};
pub use log::Entry;

/// Default soft limit for the cached request body (32 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 32 << 20;

/// App-wide settings every pooled context is created with.
#[derive(Clone, Debug)]
pub struct ContextSettings {
    /// Soft limit for the cached request body, in bytes.
    pub body_limit: usize,
    /// Renderer used regardless of `Accept`, when set.
    pub renderer: Option<Renderer>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self { body_limit: DEFAULT_BODY_LIMIT, renderer: None }
    }
}

/// Per-request state handed to every handler in the chain.
pub struct Context {
    settings: Arc<ContextSettings>,
    token: CancelToken,
    request: RequestState,
    response: ResponseWriter,
    params: Params,
    index: isize,
    handlers: HandlerChain,
    err: Option<Error>,
}

impl Context {
    pub fn new(settings: Arc<ContextSettings>) -> Self {
        Self {
            settings,
            token: CancelToken::never(),
            request: RequestState::new(),
            response: ResponseWriter::new(),
            params: Params::new(),
            index: -1,
            handlers: Arc::from(Vec::new()),
            err: None,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Binds the context to one request.
    pub fn reset(&mut self, req: http::Request<Body>, remote_addr: Option<SocketAddr>, token: CancelToken) {
        self.clear();
        self.request.reset(req, remote_addr);
        self.token = token;
    }

    /// Drops every per-request field. Params keep their capacity.
    pub(crate) fn clear(&mut self) {
        self.token = CancelToken::never();
        self.request.clear();
        self.response.reset();
        self.params.clear();
        self.index = -1;
        self.handlers = Arc::from(Vec::new());
        self.err = None;
    }

    /// Moves the buffered response out of the context.
    pub fn take_response(&mut self) -> http::Response<Full<Bytes>> {
        self.response.take()
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// The request head.
    pub fn request(&self) -> &http::request::Parts {
        self.request.parts()
    }

    /// Mutable request head, for middleware that rewrites the request before
    /// the route lookup runs.
    pub fn request_mut(&mut self) -> &mut http::request::Parts {
        self.request.parts_mut()
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// The cancellation token observed by this request.
    pub fn get_context(&self) -> &CancelToken {
        &self.token
    }

    pub fn with_context(&mut self, token: CancelToken) {
        self.token = token;
    }

    // ── Handler cursor ───────────────────────────────────────────────────────

    /// Runs the remaining handlers of the chain.
    pub fn next(&mut self) -> crate::BoxFuture<'_, ()> {
        Box::pin(async move {
            self.index += 1;
            while let Some(handler) = self.current() {
                handler.handle(self).await;
                self.index += 1;
            }
        })
    }

    /// Stops the chain: no further handler runs once the current one returns.
    pub fn end(&mut self) {
        self.index = self.handlers.len() as isize;
    }

    pub fn get_handler(&self) -> (isize, HandlerChain) {
        (self.index, Arc::clone(&self.handlers))
    }

    /// Replaces the cursor; `-1` makes the next `next()` start at the head.
    pub fn set_handler(&mut self, index: isize, handlers: HandlerChain) {
        self.index = index;
        self.handlers = handlers;
    }

    /// The error recorded by [`fatal`](Self::fatal), if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn current(&self) -> Option<HandlerFunc> {
        usize::try_from(self.index).ok().and_then(|i| self.handlers.get(i)).cloned()
    }

    // ── Parameters ───────────────────────────────────────────────────────────

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    pub fn set_param(&mut self, key: &str, val: impl Into<String>) {
        self.params.set(key, val);
    }

    pub fn add_param(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.params.add(key, val);
    }

    /// Runs a route lookup against the current method and path, writing
    /// captures straight into the params.
    pub(crate) fn match_route<F>(&mut self, lookup: F) -> HandlerChain
    where
        F: FnOnce(&str, &str, &mut Params) -> HandlerChain,
    {
        let parts = self.request.parts();
        lookup(parts.method.as_str(), parts.uri.path(), &mut self.params)
    }

    // ── Request data ─────────────────────────────────────────────────────────

    pub fn method(&self) -> &str {
        self.request.parts().method.as_str()
    }

    pub fn path(&self) -> &str {
        self.request.parts().uri.path()
    }

    pub fn uri(&self) -> &Uri {
        &self.request.parts().uri
    }

    pub fn host(&self) -> &str {
        self.request.host()
    }

    pub fn real_ip(&self) -> String {
        self.request.real_ip()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.request.remote_addr()
    }

    pub fn referer(&self) -> &str {
        self.request.header(header::REFERER).unwrap_or("")
    }

    pub fn content_type(&self) -> &str {
        self.request.header(header::CONTENT_TYPE).unwrap_or("")
    }

    pub fn is_tls(&self) -> bool {
        self.request.is_tls()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn querys(&self) -> &[(String, String)] {
        self.request.querys()
    }

    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.querys().iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.request.cookies()
    }

    pub fn get_cookie(&self, name: &str) -> Option<String> {
        self.cookies().into_iter().find(|c| c.name == name).map(|c| c.value)
    }

    /// Reads the whole body once, up to the configured limit, and caches it.
    pub async fn read_body(&mut self) -> Result<Bytes, Error> {
        let limit = self.settings.body_limit;
        self.request.read_body(limit).await
    }

    /// The cached body; empty until [`read_body`](Self::read_body) ran.
    pub fn body(&self) -> &[u8] {
        self.request.cached_body()
    }

    /// Parses an urlencoded or multipart body once.
    pub async fn parse_form(&mut self) -> Result<&Form, Error> {
        let limit = self.settings.body_limit;
        self.request.parse_form(limit).await
    }

    /// A value from the parsed form body.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.request.form().and_then(|f| f.value(key))
    }

    pub fn form_values(&self) -> &[(String, String)] {
        self.request.form().map(|f| f.values.as_slice()).unwrap_or_default()
    }

    pub fn form_file(&self, key: &str) -> Option<&FormFile> {
        self.request.form().and_then(|f| f.file(key))
    }

    pub fn form_files(&self) -> &[FormFile] {
        self.request.form().map(|f| f.files.as_slice()).unwrap_or_default()
    }

    /// Reads the body, and parses it as a form when the content type says so.
    ///
    /// Synchronous handler shapes run after this so their cached accessors see
    /// the request data.
    pub(crate) async fn prepare(&mut self) -> Result<(), Error> {
        if self.request.is_body_read() {
            return Ok(());
        }
        let content_type = self.content_type();
        if content_type.starts_with("multipart/form-data")
            || content_type.starts_with("application/x-www-form-urlencoded")
        {
            self.parse_form().await?;
        } else {
            self.read_body().await?;
        }
        Ok(())
    }

    // ── Response ─────────────────────────────────────────────────────────────

    pub fn set_header(&mut self, name: &str, value: &str) {
        if !self.response.set_header(name, value) {
            self.warn(format_args!("dropped invalid response header `{name}`"));
        }
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.response.write_header(status);
    }

    pub fn write(&mut self, data: &[u8]) {
        self.response.write(data);
    }

    pub fn write_string(&mut self, data: &str) {
        self.response.default_content_type(ContentType::Text);
        self.response.write(data.as_bytes());
    }

    /// Serializes `data` as JSON regardless of `Accept`.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<(), Error> {
        self.render_with(Renderer::Json, data)
    }

    /// Writes a file, guessing the content type from its extension.
    pub async fn write_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(ContentType::OctetStream, ContentType::from_extension);
        self.response.default_content_type(content_type);
        self.response.write(&data);
        Ok(())
    }

    pub fn redirect(&mut self, status: StatusCode, location: &str) {
        self.set_header(header::LOCATION.as_str(), location);
        self.write_header(status);
    }

    /// Announces `path` as a preload target through a `Link` header; the
    /// HTTP/2 connection has no push frames to send it with.
    pub fn push(&mut self, path: &str) {
        if !self.response.add_header(header::LINK.as_str(), &format!("<{path}>; rel=preload")) {
            self.warn(format_args!("dropped invalid push target `{path}`"));
        }
    }

    pub fn set_cookie(&mut self, cookie: &SetCookie) {
        self.response.add_header(header::SET_COOKIE.as_str(), &cookie.to_string());
    }

    pub fn set_cookie_value(&mut self, name: &str, value: &str, max_age: i64) {
        self.set_cookie(&SetCookie::new(name, value).path("/").max_age(max_age));
    }

    // ── Failure ──────────────────────────────────────────────────────────────

    /// Records `err`, answers with an error body if nothing was written yet,
    /// and ends the chain.
    pub(crate) fn fail(&mut self, err: Error) {
        if !self.response.is_committed() {
            let status = err.status();
            let body = ErrorBody { status: status.as_u16(), error: err.to_string() };
            self.response.write_header(status);
            if self.render(&body).is_err() {
                self.write_string(&body.error);
            }
        }
        self.err = Some(err);
        self.end();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(ContextSettings::default()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method())
            .field("path", &self.path())
            .field("params", &self.params)
            .field("index", &self.index)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    error: String,
}
