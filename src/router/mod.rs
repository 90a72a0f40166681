//! The router facade.
//!
//! A [`Router`] is a registration scope over a shared route core. Groups
//! created with [`Router::group`] copy the scope (path prefix, default
//! params, scoped middleware and handler extender) so whatever a group adds
//! stays inside it, while every group still registers into the same core.
//!
//! # Chain layout
//!
//! ```text
//! request ─▶ global middleware ─▶ route lookup ─┐
//!                                               ▼
//!                    scoped middleware ─▶ route handlers
//! ```
//!
//! Global middleware run before the lookup, so they can rewrite the method
//! or path the lookup sees. Scoped middleware are resolved by path prefix
//! when the route is registered and baked into its chain.

mod backend;
mod host;
mod lock;
mod middleware;
mod pattern;
mod tree;
mod validator;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::Context;
use crate::controller::{self, Controller, ControllerMethods, ControllerRoute};
use crate::error::RouteError;
use crate::extend::{HandlerExtender, HandlerValue, IntoHandlerValue};
use crate::handler::{self, BoxFuture, Handler, HandlerChain, HandlerFunc};
use crate::method::{METHOD_ANY, Method};
use crate::params::{PARAM_ACTION, PARAM_CONTROLLER, PARAM_HOST, Params};

pub use backend::{RouterCore, RouterCoreFull, RouterCoreRadix};
pub use host::RouterCoreHost;
pub use lock::RouterCoreLock;
pub use tree::RouterOptions;
pub use validator::{Validator, ValidatorFactory, ValidatorRegistry};

use middleware::MiddlewareTree;
use pattern::split_pattern;

/// Scope key for [`Router::add_middleware_with`] that installs middleware
/// in front of the route lookup for every request.
pub const MIDDLEWARE_GLOBAL: &str = "global";

/// Route registration API over a shared [`RouterCoreLock`].
///
/// Cloning a router copies its scope; every copy registers into the same core.
///
/// ```rust
/// use torii::{Context, Router};
///
/// let mut router = Router::new();
/// router.add_middleware(|ctx: &mut Context| ctx.set_header("x-frame-options", "DENY")).unwrap();
///
/// let api = router.group("/api");
/// api.get_func("/users/:id|isnum", |ctx: &mut Context| {
///     let id = ctx.get_param("id").unwrap_or("").to_owned();
///     ctx.write_string(&id);
/// })
/// .unwrap();
/// ```
#[derive(Clone)]
pub struct Router {
    core: Arc<RouterCoreLock>,
    globals: Arc<RwLock<Globals>>,
    scope: Scope,
}

#[derive(Clone)]
struct Scope {
    prefix: String,
    params: Params,
    middleware: MiddlewareTree,
    extender: HandlerExtender,
}

struct Globals {
    middleware: Vec<HandlerFunc>,
    lookup: HandlerFunc,
    /// `middleware` followed by `lookup`, rebuilt on every change.
    chain: HandlerChain,
}

/// The last global handler: matches the route and runs its chain.
struct RouteLookup {
    core: Arc<RouterCoreLock>,
    host: bool,
}

impl Handler for RouteLookup {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        if self.host {
            let host = ctx.host().to_owned();
            ctx.set_param(PARAM_HOST, host);
        }
        let chain = ctx.match_route(|method, path, params| self.core.match_func(method, path, params));
        ctx.set_handler(-1, chain);
        ctx.next()
    }
}

impl Router {
    /// A router over a [`RouterCoreFull`] with the default options.
    pub fn new() -> Self {
        Self::with_core(RouterCoreFull::new())
    }

    pub fn with_core(core: impl RouterCore) -> Self {
        let host = core.uses_host();
        let core = Arc::new(RouterCoreLock::new(core));
        let lookup = handler::handler_func(RouteLookup { core: Arc::clone(&core), host });
        let globals = Globals { middleware: Vec::new(), chain: handler::chain(vec![Arc::clone(&lookup)]), lookup };
        Self {
            core,
            globals: Arc::new(RwLock::new(globals)),
            scope: Scope {
                prefix: String::new(),
                params: Params::new(),
                middleware: MiddlewareTree::default(),
                extender: HandlerExtender::new(),
            },
        }
    }

    /// A child scope under `prefix`. The prefix may carry default params
    /// (`"/api version=v1"`) that every route of the group inherits.
    pub fn group(&self, prefix: &str) -> Router {
        let (path, kvs) = split_pattern(prefix);
        let mut scope = self.scope.clone();
        scope.prefix.push_str(path);
        scope.params.merge(&Params::parse(kvs));
        scope.extender = self.scope.extender.fork();
        Router { core: Arc::clone(&self.core), globals: Arc::clone(&self.globals), scope }
    }

    /// The path prefix routes of this group are registered under.
    pub fn prefix(&self) -> &str {
        &self.scope.prefix
    }

    /// Default params attached to every route this group registers.
    pub fn params(&self) -> &Params {
        &self.scope.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.scope.params
    }

    /// Adds middleware to every route registered later under this group.
    pub fn add_middleware<M>(&mut self, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_middleware_with("", value)
    }

    /// Adds middleware under `scope`, a path relative to the group, or
    /// globally with [`MIDDLEWARE_GLOBAL`].
    ///
    /// Global middleware wrap the route lookup of every request, including
    /// routes registered earlier and requests that end in 404/405.
    pub fn add_middleware_with<M>(&mut self, scope: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        let value = value.into_handler_value();
        if scope == MIDDLEWARE_GLOBAL {
            let handlers = self.scope.extender.new_handler_funcs(&self.scope.prefix, &value)?;
            let mut globals = self.globals.write();
            globals.middleware.extend(handlers);
            let chain = handler::combine(&[&globals.middleware, &[Arc::clone(&globals.lookup)]]);
            globals.chain = chain;
            return Ok(());
        }
        let prefix = format!("{}{}", self.scope.prefix, scope);
        let handlers = self.scope.extender.new_handler_funcs(&prefix, &value)?;
        tracing::debug!(prefix = %prefix, count = handlers.len(), "middleware registered");
        self.scope.middleware.insert(&prefix, handlers);
        Ok(())
    }

    /// Registers a converter for values of type `T` on routes under
    /// `prefix` (relative to the group).
    pub fn add_handler_extend<T, F>(&mut self, prefix: &str, convert: F)
    where
        T: Any,
        F: Fn(&str, &T) -> Option<HandlerFunc> + Send + Sync + 'static,
    {
        let prefix = format!("{}{}", self.scope.prefix, prefix);
        self.scope.extender.register(&prefix, convert);
    }

    /// Registers `value` for `method` (a name, a comma-separated list, `ANY`,
    /// `404` or `405`) on `path`, relative to the group.
    ///
    /// `path` may carry default params after a space; `register=off` removes
    /// the route instead. Nothing is registered when an error is returned.
    pub fn add_handler<M>(&self, method: &str, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler_value(method, path, &value.into_handler_value())
    }

    fn add_handler_value(&self, method: &str, path: &str, value: &HandlerValue) -> Result<(), RouteError> {
        let (pattern, kvs) = split_pattern(path);
        let full = format!("{}{}", self.scope.prefix, pattern);
        let method = method.to_ascii_uppercase();

        let handlers = self.scope.extender.new_handler_funcs(&full, value)?;
        if handlers.is_empty() {
            return Err(RouteError::EmptyChain { method, path: full });
        }
        let middleware = self.scope.middleware.lookup(&full);
        let chain = handler::combine(&[&middleware, &handlers]);

        let mut params = self.scope.params.clone();
        params.merge(&Params::parse(kvs));
        let registered = if params.is_empty() { full } else { format!("{full} {params}") };

        self.core.handle_func(&method, &registered, chain)?;
        tracing::debug!(method = %method, path = %registered, "route registered");
        Ok(())
    }

    /// Registers every routable member of `controller`; each request runs on
    /// a fresh clone of it.
    ///
    /// The clone is taken from the value passed in here, not from a zeroed
    /// `C::default()`: fields set before registration (a client handle, a
    /// prefix) reach every request, while anything a request changes is
    /// dropped with its clone. Per-request fields belong in
    /// [`Controller::init`].
    pub fn add_controller<C>(&self, controller: C) -> Result<(), RouteError>
    where
        C: Controller + ControllerMethods + Clone,
    {
        self.add_controller_routes(controller::base_routes(controller))
    }

    /// Registers every routable member of `controller`; all requests share
    /// the one instance, one at a time.
    pub fn add_controller_singleton<C>(&self, controller: C) -> Result<(), RouteError>
    where
        C: Controller + ControllerMethods,
    {
        self.add_controller_routes(controller::singleton_routes(controller))
    }

    fn add_controller_routes(&self, routes: Vec<ControllerRoute>) -> Result<(), RouteError> {
        for ControllerRoute { method, path, action } in routes {
            let path = if path.is_empty() { "/" } else { path.as_str() };
            let (pattern, kvs) = split_pattern(path);
            let path = format!(
                "{pattern} {PARAM_CONTROLLER}={} {PARAM_ACTION}={} {kvs}",
                action.controller(),
                action.action()
            );
            let controller = action.controller();
            let member = action.action();
            self.add_handler_value(&method, path.trim_end(), &HandlerValue::new(action))
                .map_err(|e| RouteError::Controller {
                    controller: controller.to_owned(),
                    member: member.to_owned(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub fn any_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(METHOD_ANY, path, value)
    }

    pub fn get_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Get.as_str(), path, value)
    }

    pub fn post_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Post.as_str(), path, value)
    }

    pub fn put_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Put.as_str(), path, value)
    }

    pub fn delete_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Delete.as_str(), path, value)
    }

    pub fn head_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Head.as_str(), path, value)
    }

    pub fn patch_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Patch.as_str(), path, value)
    }

    pub fn options_func<M>(&self, path: &str, value: impl IntoHandlerValue<M>) -> Result<(), RouteError> {
        self.add_handler(Method::Options.as_str(), path, value)
    }

    /// The chain every request starts with: global middleware, then the
    /// route lookup.
    pub fn handlers(&self) -> HandlerChain {
        Arc::clone(&self.globals.read().chain)
    }

    /// Looks a route up directly, bypassing global middleware.
    pub fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        self.core.match_func(method, path, params)
    }

    pub fn core(&self) -> &Arc<RouterCoreLock> {
        &self.core
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.scope.prefix)
            .field("params", &self.scope.params)
            .field("scoped_middleware", &!self.scope.middleware.is_empty())
            .field("global_middleware", &self.globals.read().middleware.len())
            .finish()
    }
}
