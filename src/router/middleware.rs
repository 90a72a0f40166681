//! Path-prefix scoped middleware.

use crate::handler::HandlerFunc;

/// Middleware keyed by the path prefix it applies to.
///
/// Each group owns a copy, so middleware added in a child group never leaks
/// into its parent or siblings.
#[derive(Clone, Default)]
pub(crate) struct MiddlewareTree {
    entries: Vec<(String, Vec<HandlerFunc>)>,
}

impl MiddlewareTree {
    pub(crate) fn insert(&mut self, prefix: &str, handlers: Vec<HandlerFunc>) {
        match self.entries.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, existing)) => existing.extend(handlers),
            None => self.entries.push((prefix.to_owned(), handlers)),
        }
    }

    /// Middleware whose prefix covers `path`, shortest prefix first and in
    /// registration order within one prefix.
    pub(crate) fn lookup(&self, path: &str) -> Vec<HandlerFunc> {
        let mut matched: Vec<&(String, Vec<HandlerFunc>)> =
            self.entries.iter().filter(|(p, _)| covers(p, path)).collect();
        matched.sort_by_key(|(p, _)| p.len());
        matched.into_iter().flat_map(|(_, hs)| hs.iter().cloned()).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `/api` covers `/api` and `/api/users` but not `/apix`.
fn covers(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
