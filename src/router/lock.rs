//! A core that can be registered into while it is serving.

use parking_lot::RwLock;

use crate::error::RouteError;
use crate::handler::HandlerChain;
use crate::params::Params;
use crate::router::backend::RouterCore;

/// Wraps a core behind a read/write lock.
///
/// Matching takes the read lock and registration the write lock, so routes
/// can be added from another task while requests are being served. Every
/// [`Router`](crate::Router) keeps its core behind one of these.
pub struct RouterCoreLock {
    inner: RwLock<Box<dyn RouterCore>>,
}

impl RouterCoreLock {
    pub fn new(core: impl RouterCore) -> Self {
        Self::from_box(Box::new(core))
    }

    pub fn from_box(core: Box<dyn RouterCore>) -> Self {
        Self { inner: RwLock::new(core) }
    }

    /// Registers through a shared reference.
    pub fn handle_func(&self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        self.inner.write().handle_func(method, path, handlers)
    }

    pub fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        self.inner.read().match_func(method, path, params)
    }
}

impl RouterCore for RouterCoreLock {
    fn handle_func(&mut self, method: &str, path: &str, handlers: HandlerChain) -> Result<(), RouteError> {
        self.inner.get_mut().handle_func(method, path, handlers)
    }

    fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        RouterCoreLock::match_func(self, method, path, params)
    }

    fn uses_host(&self) -> bool {
        self.inner.read().uses_host()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::handler::{self, BoxFuture, handler_func};
    use crate::router::backend::RouterCoreRadix;
    use crate::Context;

    fn noop(_: &mut Context) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    #[test]
    fn registers_while_shared() {
        let core = Arc::new(RouterCoreLock::new(RouterCoreRadix::new()));
        let writer = Arc::clone(&core);
        std::thread::spawn(move || {
            let chain = handler::chain(vec![handler_func(noop), handler_func(noop)]);
            writer.handle_func("GET", "/late", chain).unwrap();
        })
        .join()
        .unwrap();

        let mut params = Params::new();
        assert_eq!(core.match_func("GET", "/late", &mut params).len(), 2);
        assert_eq!(params.get("route"), Some("/late"));
    }
}
