//! Router cores: the storage and matching half of a router.
//!
//! A [`RouterCore`] only knows `(method, path) -> chain`. Groups, middleware
//! and handler conversion live in the [`Router`](crate::Router) facade, which
//! hands every finished chain to its core.

use crate::error::RouteError;
use crate::handler::HandlerChain;
use crate::params::Params;
use crate::router::tree::{RouteTree, RouterOptions};
use crate::router::validator::ValidatorRegistry;

/// Route storage and lookup.
///
/// `method` is an uppercase method name (or a comma-separated list), `ANY`,
/// or one of the special methods `404`/`405`, which replace the chain
/// returned on a miss. Matching never fails: a miss answers with the not-found or
/// method-not-allowed chain and adds no params.
pub trait RouterCore: Send + Sync + 'static {
    fn handle_func(&mut self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError>;

    fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain;

    /// Whether matching reads the request host from the `host` param.
    fn uses_host(&self) -> bool {
        false
    }
}

impl RouterCore for Box<dyn RouterCore> {
    fn handle_func(&mut self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        (**self).handle_func(method, path, handlers)
    }

    fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        (**self).match_func(method, path, params)
    }

    fn uses_host(&self) -> bool {
        (**self).uses_host()
    }
}

/// Literal, param and catchall segments. Rejects constrained segments.
pub struct RouterCoreRadix {
    tree: RouteTree,
}

impl RouterCoreRadix {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self { tree: RouteTree::new(options, None) }
    }
}

impl Default for RouterCoreRadix {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterCore for RouterCoreRadix {
    fn handle_func(&mut self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        self.tree.handle_func(method, path, handlers)
    }

    fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        self.tree.match_func(method, path, params)
    }
}

/// The radix core plus validator-constrained segments.
pub struct RouterCoreFull {
    tree: RouteTree,
}

impl RouterCoreFull {
    pub fn new() -> Self {
        Self::with_validators(RouterOptions::default(), ValidatorRegistry::new())
    }

    /// A core resolving constraints against `validators`.
    pub fn with_validators(options: RouterOptions, validators: ValidatorRegistry) -> Self {
        Self { tree: RouteTree::new(options, Some(validators)) }
    }
}

impl Default for RouterCoreFull {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterCore for RouterCoreFull {
    fn handle_func(&mut self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        self.tree.handle_func(method, path, handlers)
    }

    fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        self.tree.match_func(method, path, params)
    }
}
