//! Controllers: one type whose methods become routes.
//!
//! Member names are split into words; the first word is the HTTP verb and
//! the rest become path segments, with `by X` turning into a `:x` param.
//! The controller is mounted under its [`group`](Controller::group), which
//! defaults to the type name without a `Controller` suffix.
//!
//! | Member | Route under `UserController` |
//! |---|---|
//! | `get` | `GET /user` |
//! | `get_by_id` | `GET /user/:id` |
//! | `post_login` | `POST /user/login` |
//! | `any_ping` | `ANY /user/ping` |
//! | `helper` | not routed (no verb) |
//!
//! ```rust
//! use torii::{controller_methods, Context, Controller, Error, Router};
//!
//! #[derive(Clone, Default)]
//! struct UserController;
//!
//! impl Controller for UserController {}
//!
//! impl UserController {
//!     fn get_by_id(&mut self, ctx: &mut Context) -> Result<String, Error> {
//!         Ok(format!("user {}", ctx.get_param("id").unwrap_or("")))
//!     }
//! }
//!
//! controller_methods!(UserController { get_by_id });
//!
//! let mut router = Router::new();
//! router.add_controller(UserController).unwrap();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::Error;
use crate::extend::{Prepared, reply, shape};
use crate::handler::{HandlerFunc, handler_func};
use crate::method::{METHOD_ANY, Method};

/// Hooks and routing overrides for a controller type.
pub trait Controller: Send + Sync + 'static {
    /// Runs before every member call; an error skips the member.
    fn init(&mut self, _ctx: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// Runs after every member call whose `init` succeeded.
    fn release(&mut self, _ctx: &mut Context) -> Result<(), Error> {
        Ok(())
    }

    /// Per-member overrides: `-` skips the member, `/path` replaces the
    /// derived path, `METHOD /path` replaces both. Paths are relative to
    /// the controller group.
    fn controller_route(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// The path segment the controller is mounted under.
    fn group(&self) -> String {
        default_group(short_type_name::<Self>())
    }
}

/// The routable members of a controller; written by [`controller_methods!`](crate::controller_methods).
pub trait ControllerMethods: Sized {
    fn members() -> Vec<Member<Self>>;
}

/// A member call with its result already rendered.
pub type MemberFn<C> = Arc<dyn Fn(&mut C, &mut Context) -> Result<(), Error> + Send + Sync>;

/// Member shapes a controller method may have.
///
/// `&mut self` plus the context, returning nothing or a `Result` whose `Ok`
/// value is rendered; a third argument is bound from the request.
pub trait ControllerMethod<C, M> {
    fn into_member_fn(self) -> MemberFn<C>;
}

impl<C, F> ControllerMethod<C, shape::Plain> for F
where
    C: 'static,
    F: Fn(&mut C, &mut Context) + Send + Sync + 'static,
{
    fn into_member_fn(self) -> MemberFn<C> {
        let f = self;
        Arc::new(move |c: &mut C, ctx: &mut Context| {
            f(c, ctx);
            Ok(())
        })
    }
}

impl<C, F, V, E> ControllerMethod<C, shape::Fallible<V, E>> for F
where
    C: 'static,
    F: Fn(&mut C, &mut Context) -> Result<V, E> + Send + Sync + 'static,
    V: Serialize + 'static,
    E: Into<Error>,
{
    fn into_member_fn(self) -> MemberFn<C> {
        let f = self;
        Arc::new(move |c: &mut C, ctx: &mut Context| {
            let value = f(c, ctx).map_err(Into::into)?;
            reply(ctx, &value)
        })
    }
}

impl<C, F, T, V, E> ControllerMethod<C, shape::Typed<T, V, E>> for F
where
    C: 'static,
    F: Fn(&mut C, &mut Context, T) -> Result<V, E> + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    V: Serialize + 'static,
    E: Into<Error>,
{
    fn into_member_fn(self) -> MemberFn<C> {
        let f = self;
        Arc::new(move |c: &mut C, ctx: &mut Context| {
            let input: T = ctx.bind_cached()?;
            let value = f(c, ctx, input).map_err(Into::into)?;
            reply(ctx, &value)
        })
    }
}

/// One named member of a controller.
pub struct Member<C> {
    name: &'static str,
    call: MemberFn<C>,
}

impl<C> Member<C> {
    pub fn new<M>(name: &'static str, method: impl ControllerMethod<C, M>) -> Self {
        Self { name, call: method.into_member_fn() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Lists the methods of a controller that may become routes.
///
/// ```rust,ignore
/// controller_methods!(UserController { get, get_by_id, post_login });
/// ```
#[macro_export]
macro_rules! controller_methods {
    ($controller:ty { $($member:ident),* $(,)? }) => {
        impl $crate::ControllerMethods for $controller {
            fn members() -> ::std::vec::Vec<$crate::Member<Self>> {
                ::std::vec![$($crate::Member::new(::std::stringify!($member), <$controller>::$member)),*]
            }
        }
    };
}

/// A controller member resolved at registration time, ready to be turned
/// into a handler by the extender.
pub struct ControllerAction {
    pub(crate) controller: &'static str,
    pub(crate) action: &'static str,
    call: Arc<dyn Fn(&mut Context) -> Result<(), Error> + Send + Sync>,
}

impl ControllerAction {
    pub fn controller(&self) -> &'static str {
        self.controller
    }

    pub fn action(&self) -> &'static str {
        self.action
    }
}

pub(crate) fn action_handler(action: &ControllerAction) -> HandlerFunc {
    handler_func(Prepared(Arc::clone(&action.call)))
}

/// A member with its derived method and path (relative to the router group).
pub(crate) struct ControllerRoute {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) action: ControllerAction,
}

/// Routes for a controller cloned afresh for every request.
pub(crate) fn base_routes<C>(prototype: C) -> Vec<ControllerRoute>
where
    C: Controller + ControllerMethods + Clone,
{
    let group = prototype.group();
    let overrides = prototype.controller_route();
    let prototype = Arc::new(prototype);
    routes::<C>(&group, &overrides, |call| -> ActionFn {
        let prototype = Arc::clone(&prototype);
        Arc::new(move |ctx: &mut Context| {
            let mut controller = C::clone(&prototype);
            run(&mut controller, ctx, &call)
        })
    })
}

/// Routes for one controller instance shared by every request.
pub(crate) fn singleton_routes<C>(controller: C) -> Vec<ControllerRoute>
where
    C: Controller + ControllerMethods,
{
    let group = controller.group();
    let overrides = controller.controller_route();
    let shared = Arc::new(Mutex::new(controller));
    routes::<C>(&group, &overrides, |call| -> ActionFn {
        let shared = Arc::clone(&shared);
        Arc::new(move |ctx: &mut Context| {
            let mut controller = shared.lock();
            run(&mut *controller, ctx, &call)
        })
    })
}

fn run<C: Controller>(controller: &mut C, ctx: &mut Context, call: &MemberFn<C>) -> Result<(), Error> {
    controller.init(ctx)?;
    let result = call(controller, ctx);
    let released = controller.release(ctx);
    result.and(released)
}

type ActionFn = Arc<dyn Fn(&mut Context) -> Result<(), Error> + Send + Sync>;

fn routes<C>(
    group: &str,
    overrides: &[(&'static str, &'static str)],
    mut bind: impl FnMut(MemberFn<C>) -> ActionFn,
) -> Vec<ControllerRoute>
where
    C: Controller + ControllerMethods,
{
    let base = if group.is_empty() { String::new() } else { format!("/{}", group.trim_matches('/')) };
    let controller = short_type_name::<C>();
    let mut out = Vec::new();
    for member in C::members() {
        let override_ = overrides.iter().find(|(name, _)| *name == member.name).map(|(_, v)| *v);
        let Some((method, path)) = member_route(member.name, override_) else {
            continue;
        };
        let call = bind(member.call);
        out.push(ControllerRoute {
            method,
            path: format!("{base}{path}"),
            action: ControllerAction { controller, action: member.name, call },
        });
    }
    out
}

/// Derives `(method, path)` for a member, honouring an override.
pub(crate) fn member_route(member: &str, override_: Option<&str>) -> Option<(String, String)> {
    let words = split_words(member);
    let (verb, rest) = words.split_first()?;
    let method = match Method::from_verb(verb) {
        Some(Some(m)) => Some(m.as_str().to_owned()),
        Some(None) => Some(METHOD_ANY.to_owned()),
        None => None,
    };
    let derived = if method.is_some() { derive_path(rest) } else { derive_path(&words) };

    match override_.map(str::trim) {
        Some("-") => None,
        Some(path) if path.starts_with('/') => Some((method.unwrap_or_else(|| METHOD_ANY.to_owned()), path.to_owned())),
        Some(spec) => match spec.split_once(char::is_whitespace) {
            Some((m, path)) => Some((m.to_ascii_uppercase(), path.trim().to_owned())),
            None => Some((spec.to_ascii_uppercase(), derived)),
        },
        None => method.map(|m| (m, derived)),
    }
}

fn derive_path(words: &[String]) -> String {
    let mut path = String::new();
    let mut words = words.iter();
    while let Some(word) = words.next() {
        path.push('/');
        if word == "by" {
            if let Some(name) = words.next() {
                path.push(':');
                path.push_str(name);
                continue;
            }
        }
        path.push_str(word);
    }
    path
}

/// Splits `get_by_id`, `getById` and `GetByID` into lowercase words.
pub(crate) fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev_lower || next_lower {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let end = full.find('<').unwrap_or(full.len());
    let path = &full[..end];
    path.rsplit("::").next().unwrap_or(path)
}

fn default_group(type_name: &str) -> String {
    type_name.strip_suffix("Controller").unwrap_or(type_name).to_lowercase()
}
