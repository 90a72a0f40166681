//! Host-based routing: one inner core per host pattern.

use crate::error::RouteError;
use crate::handler::HandlerChain;
use crate::method::{METHOD_NOT_ALLOWED, METHOD_NOT_FOUND};
use crate::params::{PARAM_HOST, Params};
use crate::router::backend::{RouterCore, RouterCoreFull};
use crate::router::pattern::split_pattern;

type CoreFactory = Box<dyn Fn() -> Box<dyn RouterCore> + Send + Sync>;

/// Dispatches on the `host` param before matching the path.
///
/// Routes registered with `host=PATTERN[,PATTERN...]` go to the inner core
/// for each pattern; routes without one go to the default core. Patterns are
/// globs where `*` spans any run of characters, and they are tried in the
/// order they were first seen. On a match the `host` param is overwritten with
/// the pattern itself so handlers can tell which bucket served them.
///
/// The caller puts the request host into `host` before matching; the
/// [`Router`](crate::Router) facade does this for every request.
pub struct RouterCoreHost {
    hosts: Vec<(String, Box<dyn RouterCore>)>,
    default: Box<dyn RouterCore>,
    factory: CoreFactory,
    /// 404/405 registrations, replayed into buckets created later.
    specials: Vec<(String, String, HandlerChain)>,
}

impl RouterCoreHost {
    /// Host routing over [`RouterCoreFull`] buckets.
    pub fn new() -> Self {
        Self::with_factory(|| Box::new(RouterCoreFull::new()))
    }

    /// Host routing over buckets built by `factory`.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn RouterCore> + Send + Sync + 'static,
    {
        Self { hosts: Vec::new(), default: factory(), factory: Box::new(factory), specials: Vec::new() }
    }

    /// Registers into the bucket for `pattern`. A new bucket is only kept once
    /// the route is in it, so a failed registration adds no host.
    fn register_in(&mut self, pattern: &str, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        if let Some((_, core)) = self.hosts.iter_mut().find(|(p, _)| p == pattern) {
            return core.handle_func(method, path, handlers);
        }
        let mut core = (self.factory)();
        for (special, at, chain) in &self.specials {
            core.handle_func(special, at, chain.clone())?;
        }
        core.handle_func(method, path, handlers)?;
        self.hosts.push((pattern.to_owned(), core));
        Ok(())
    }
}

impl Default for RouterCoreHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterCore for RouterCoreHost {
    fn handle_func(&mut self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        if method == METHOD_NOT_FOUND || method == METHOD_NOT_ALLOWED {
            self.default.handle_func(method, path, handlers.clone())?;
            for (_, core) in &mut self.hosts {
                core.handle_func(method, path, handlers.clone())?;
            }
            self.specials.push((method.to_owned(), path.to_owned(), handlers));
            return Ok(());
        }

        let (pattern, kvs) = split_pattern(path);
        let mut params = Params::parse(kvs);
        let hosts = params.get(PARAM_HOST).unwrap_or("").to_owned();
        if hosts.is_empty() {
            return self.default.handle_func(method, path, handlers);
        }
        params.remove(PARAM_HOST);
        let path = if params.is_empty() { pattern.to_owned() } else { format!("{pattern} {params}") };
        // A scratch core rejects bad patterns, validators and methods before
        // any bucket changes.
        (self.factory)().handle_func(method, &path, handlers.clone())?;
        for host in hosts.split(',').filter(|h| !h.is_empty()) {
            self.register_in(host, method, &path, handlers.clone())?;
        }
        Ok(())
    }

    fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        let host = params.get(PARAM_HOST).unwrap_or("");
        if let Some((pattern, core)) = self.hosts.iter().find(|(p, _)| glob_match(p, host)) {
            params.set(PARAM_HOST, pattern.as_str());
            return core.match_func(method, path, params);
        }
        self.default.match_func(method, path, params)
    }

    fn uses_host(&self) -> bool {
        true
    }
}

/// Matches `text` against a pattern where `*` spans any run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
