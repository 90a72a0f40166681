//! # torii
//!
//! An HTTP application framework built from three small pieces: a radix
//! route tree, a cursor-driven handler chain and a registry that turns
//! ordinary values into handlers.
//!
//! ## How a request flows
//!
//! ```text
//! hyper ─▶ ContextPool::get ─▶ global middleware ─▶ route lookup
//!                                                       │
//!            scoped middleware + route handlers  ◀──────┘
//!                                 │
//!          ContextPool::put  ◀────┘
//! ```
//!
//! - **Routing.** Patterns are compiled into a radix tree with literal,
//!   `:param` and `*catchall` segments. Params may carry validators
//!   (`:id|isnum`, `:slug|{[a-z-]+}`). Lookup prefers literals, then params in
//!   registration order, then catchalls, and backtracks on a dead end.
//! - **Chains.** Middleware and handlers are flattened into one chain per
//!   route when the route is registered. At request time the chain is walked
//!   by [`Context::next`]; [`Context::end`] stops it.
//! - **Handler values.** Routes accept async handlers, sync closures,
//!   fallible and typed closures, strings, errors, plain `http` handlers and
//!   controllers. The [`HandlerExtender`] converts them at registration.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use torii::{App, Config, Context, Error, MIDDLEWARE_GLOBAL, middleware};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut app = App::new(Config::default());
//!     let router = app.router_mut();
//!     router.add_middleware_with(MIDDLEWARE_GLOBAL, middleware::logger)?;
//!
//!     let api = router.group("/api/v1");
//!     api.get_func("/users/:id|isnum", |ctx: &mut Context| -> Result<String, Error> {
//!         Ok(ctx.get_param("id").unwrap_or_default().to_owned())
//!     })?;
//!     api.post_func("/users", |_: &mut Context, input: NewUser| -> Result<User, Error> {
//!         Ok(User { id: 99, name: input.name })
//!     })?;
//!
//!     app.listen_and_serve().await
//! }
//! ```

mod app;
mod cancel;
mod config;
mod context;
mod controller;
mod error;
mod extend;
mod handler;
mod method;
mod params;
mod pool;
mod request;
mod response;
mod router;

pub mod middleware;

pub use app::App;
pub use cancel::{CancelSource, CancelToken};
pub use config::{Config, RouterConfig, RouterKind};
pub use context::{Binder, Context, ContextSettings, DEFAULT_BODY_LIMIT, Entry, Renderer, Validate};
pub use controller::{Controller, ControllerAction, ControllerMethod, ControllerMethods, Member, MemberFn};
pub use error::{BoxError, ConfigError, Error, RouteError};
pub use extend::{HandlerExtender, HandlerValue, IntoHandlerValue, NativeHandler, NewHandler, shape};
pub use handler::{BoxFuture, Handler, HandlerChain, HandlerFunc, chain, combine, handler_func, method_not_allowed, not_found};
pub use method::{DEFAULT_ALL_METHODS, DEFAULT_ANY_METHODS, METHOD_ANY, METHOD_NOT_ALLOWED, METHOD_NOT_FOUND, Method};
pub use params::{PARAM_ACTION, PARAM_CONTROLLER, PARAM_HOST, PARAM_REGISTER, PARAM_ROUTE, Params};
pub use pool::ContextPool;
pub use request::{Body, Cookie, Form, FormFile, empty, full};
pub use response::{ContentType, ResponseWriter, SameSite, SetCookie};
pub use router::{
    MIDDLEWARE_GLOBAL, Router, RouterCore, RouterCoreFull, RouterCoreHost, RouterCoreLock, RouterCoreRadix,
    RouterOptions, Validator, ValidatorFactory, ValidatorRegistry,
};
