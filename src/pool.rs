//! Context recycling.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{Context, ContextSettings};

/// Idle contexts kept for reuse at most.
const MAX_IDLE: usize = 1024;

/// A free list of [`Context`] values.
///
/// Each request takes one context with [`get`](Self::get) and hands it back
/// with [`put`](Self::put). A returned context is cleared before it becomes
/// available again, so no request data outlives its request.
#[derive(Debug)]
pub struct ContextPool {
    settings: Arc<ContextSettings>,
    idle: Mutex<Vec<Box<Context>>>,
}

impl ContextPool {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings: Arc::new(settings), idle: Mutex::new(Vec::new()) }
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Takes an idle context, or builds one when the pool is empty.
    pub fn get(&self) -> Box<Context> {
        self.idle
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(Context::new(Arc::clone(&self.settings))))
    }

    /// Clears `ctx` and returns it to the pool.
    pub fn put(&self, mut ctx: Box<Context>) {
        ctx.clear();
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(ctx);
        }
    }

    /// Number of idle contexts.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(ContextSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::request::empty;

    #[test]
    fn put_clears_and_reuses() {
        let pool = ContextPool::default();
        let mut ctx = pool.get();
        let req = http::Request::builder().uri("/a?x=1").body(empty()).unwrap();
        ctx.reset(req, None, CancelToken::never());
        ctx.set_param("id", "7");
        ctx.write_string("hello");
        pool.put(ctx);
        assert_eq!(pool.idle(), 1);

        let ctx = pool.get();
        assert_eq!(pool.idle(), 0);
        assert!(ctx.params().is_empty());
        assert!(ctx.response().body().is_empty());
        assert!(ctx.err().is_none());
        assert_eq!(ctx.get_handler().0, -1);
    }
}
