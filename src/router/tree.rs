//! The radix tree shared by the radix and full router cores.
//!
//! Literal text is compressed into const children keyed by their first
//! character. Dynamic children keep their registration order: params (plain
//! and constrained alike) and then catchalls. Lookup is a depth-first walk
//! in that order that backtracks when a branch fails, and it is method-aware,
//! so a branch that only lacks the method does not hide a later branch that
//! has it.

use std::mem;

use crate::error::RouteError;
use crate::handler::{self, HandlerChain};
use crate::method::{DEFAULT_ALL_METHODS, DEFAULT_ANY_METHODS, METHOD_ANY, METHOD_NOT_ALLOWED, METHOD_NOT_FOUND, Method};
use crate::params::{PARAM_REGISTER, PARAM_ROUTE, Params};
use crate::router::pattern::{Check, Pattern, Segment, same_check};
use crate::router::validator::ValidatorRegistry;

/// Which methods a router core accepts.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Methods an `ANY` route answers.
    pub any_methods: Vec<String>,
    /// Methods that may be registered at all.
    pub all_methods: Vec<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            any_methods: Method::names(DEFAULT_ANY_METHODS),
            all_methods: Method::names(DEFAULT_ALL_METHODS),
        }
    }
}

struct Route {
    method: String,
    chain: HandlerChain,
    /// `route` followed by the registration key/values.
    params: Params,
}

#[derive(Default)]
struct Node {
    /// Literal text for const nodes.
    path: String,
    /// Capture name for param and catchall nodes.
    name: String,
    check: Option<Check>,
    consts: Vec<Node>,
    params: Vec<Node>,
    catchalls: Vec<Node>,
    routes: Vec<Route>,
}

impl Node {
    fn constant(path: &str) -> Self {
        Self { path: path.to_owned(), ..Self::default() }
    }

    fn dynamic(name: &str, check: &Option<Check>) -> Self {
        Self { name: name.to_owned(), check: check.clone(), ..Self::default() }
    }

    fn insert(&mut self, segments: &[Segment]) -> &mut Node {
        let Some((first, rest)) = segments.split_first() else {
            return self;
        };
        let child = match first {
            Segment::Const(text) => self.insert_const(text),
            Segment::Param { name, check } => dynamic_child(&mut self.params, name, check),
            Segment::Catchall { name, check } => dynamic_child(&mut self.catchalls, name, check),
        };
        child.insert(rest)
    }

    fn insert_const(&mut self, text: &str) -> &mut Node {
        let Some(first) = text.chars().next() else {
            return self;
        };
        let Some(i) = self.consts.iter().position(|c| c.path.starts_with(first)) else {
            self.consts.push(Node::constant(text));
            let last = self.consts.len() - 1;
            return &mut self.consts[last];
        };
        let child = &mut self.consts[i];
        let shared = common_prefix(&child.path, text);
        if shared < child.path.len() {
            child.split(shared);
        }
        child.insert_const(&text[shared..])
    }

    /// Moves everything below byte `at` of this node's text into a new child.
    fn split(&mut self, at: usize) {
        let tail = Node {
            path: self.path[at..].to_owned(),
            name: String::new(),
            check: None,
            consts: mem::take(&mut self.consts),
            params: mem::take(&mut self.params),
            catchalls: mem::take(&mut self.catchalls),
            routes: mem::take(&mut self.routes),
        };
        self.path.truncate(at);
        self.consts = vec![tail];
    }

    /// The node `segments` names, without creating anything.
    fn find_exact(&mut self, segments: &[Segment]) -> Option<&mut Node> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        let child = match first {
            Segment::Const(text) => self.const_exact(text)?,
            Segment::Param { name, check } => self
                .params
                .iter_mut()
                .find(|c| c.name == *name && same_check(&c.check, check))?,
            Segment::Catchall { name, check } => self
                .catchalls
                .iter_mut()
                .find(|c| c.name == *name && same_check(&c.check, check))?,
        };
        child.find_exact(rest)
    }

    fn const_exact(&mut self, text: &str) -> Option<&mut Node> {
        if text.is_empty() {
            return Some(self);
        }
        let child = self.consts.iter_mut().find(|c| text.starts_with(c.path.as_str()))?;
        let rest = &text[child.path.len()..];
        child.const_exact(rest)
    }

    fn route(&self, method: &str, any: bool) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.method == method)
            .or_else(|| if any { self.routes.iter().find(|r| r.method == METHOD_ANY) } else { None })
    }

    /// Walks `search`, the part of the request path below this node.
    fn lookup<'n, 'p>(
        &'n self,
        method: &str,
        any: bool,
        search: &'p str,
        captures: &mut Vec<(&'n str, &'p str)>,
        miss: &mut bool,
    ) -> Option<&'n Route> {
        // Path consumed: this node answers if it has the method (or ANY).
        // Routes under other methods only remember a 405 and the walk goes on,
        // since a later sibling may still carry the method.
        if search.is_empty() {
            if let Some(route) = self.route(method, any) {
                return Some(route);
            }
            if !self.routes.is_empty() {
                *miss = true;
            }
        }

        // Const children never share a first character, so at most one fits.
        if let Some(first) = search.chars().next() {
            if let Some(child) = self.consts.iter().find(|c| c.path.starts_with(first)) {
                if let Some(rest) = search.strip_prefix(child.path.as_str()) {
                    if let Some(route) = child.lookup(method, any, rest, captures, miss) {
                        return Some(route);
                    }
                }
            }
        }

        // Params capture up to the next `/`, tried in registration order. A
        // capture is pushed before descending and popped when that subtree
        // fails, so a dead end leaves no stray value behind.
        if !self.params.is_empty() {
            let end = search.find('/').unwrap_or(search.len());
            let (value, rest) = search.split_at(end);
            if !value.is_empty() {
                for child in &self.params {
                    if !child.check.as_ref().is_none_or(|c| c.matches(value)) {
                        continue;
                    }
                    captures.push((child.name.as_str(), value));
                    if let Some(route) = child.lookup(method, any, rest, captures, miss) {
                        return Some(route);
                    }
                    captures.pop();
                }
            }
        }

        // Catchalls take the rest (possibly empty) and end the walk.
        for child in &self.catchalls {
            if !child.check.as_ref().is_none_or(|c| c.matches(search)) {
                continue;
            }
            if let Some(route) = child.route(method, any) {
                captures.push((child.name.as_str(), search));
                return Some(route);
            }
            if !child.routes.is_empty() {
                *miss = true;
            }
        }
        None
    }
}

fn dynamic_child<'a>(children: &'a mut Vec<Node>, name: &str, check: &Option<Check>) -> &'a mut Node {
    let i = match children.iter().position(|c| c.name == name && same_check(&c.check, check)) {
        Some(i) => i,
        None => {
            children.push(Node::dynamic(name, check));
            children.len() - 1
        }
    };
    &mut children[i]
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or_else(|| a.len().min(b.len()), |((i, _), _)| i)
}

/// Route storage and lookup for one tree; wrapped by the radix and full cores.
pub(crate) struct RouteTree {
    root: Node,
    options: RouterOptions,
    validators: Option<ValidatorRegistry>,
    not_found: HandlerChain,
    method_not_allowed: HandlerChain,
}

impl RouteTree {
    pub(crate) fn new(options: RouterOptions, validators: Option<ValidatorRegistry>) -> Self {
        Self {
            root: Node::default(),
            options,
            validators,
            not_found: handler::chain(vec![handler::handler_func(handler::not_found)]),
            method_not_allowed: handler::chain(vec![handler::handler_func(handler::method_not_allowed)]),
        }
    }

    /// Registers `chain` for a method or a comma-separated method list. Every
    /// method is checked before anything is inserted.
    pub(crate) fn handle_func(&mut self, method: &str, path: &str, chain: HandlerChain) -> Result<(), RouteError> {
        match method {
            METHOD_NOT_FOUND => {
                self.not_found = chain;
                return Ok(());
            }
            METHOD_NOT_ALLOWED => {
                self.method_not_allowed = chain;
                return Ok(());
            }
            _ => {}
        }
        let mut pattern = Pattern::parse(path, self.validators.as_ref())?;
        let methods: Vec<&str> = method.split(',').map(str::trim).filter(|m| !m.is_empty()).collect();
        if methods.is_empty() {
            return Err(RouteError::UnsupportedMethod { method: method.to_owned() });
        }
        if let Some(bad) = methods
            .iter()
            .find(|m| **m != METHOD_ANY && !self.options.all_methods.iter().any(|a| a == *m))
        {
            return Err(RouteError::UnsupportedMethod { method: (*bad).to_owned() });
        }

        if pattern.params.get(PARAM_REGISTER) == Some("off") {
            if let Some(node) = self.root.find_exact(&pattern.segments) {
                node.routes.retain(|r| !methods.contains(&r.method.as_str()));
            }
            return Ok(());
        }
        pattern.params.remove(PARAM_REGISTER);
        self.check_catchall(&pattern, &methods)?;

        let mut params = Params::new();
        params.add(PARAM_ROUTE, pattern.path.as_str());
        params.merge(&pattern.params);

        let node = self.root.insert(&pattern.segments);
        for method in methods {
            let route = Route { method: method.to_owned(), chain: chain.clone(), params: params.clone() };
            match node.routes.iter_mut().find(|r| r.method == method) {
                Some(existing) => *existing = route,
                None => node.routes.push(route),
            }
        }
        Ok(())
    }

    /// Rejects a second unconstrained catchall at the same place for an
    /// overlapping method: lookup tries catchalls in order, so it could never
    /// be reached.
    fn check_catchall(&mut self, pattern: &Pattern, methods: &[&str]) -> Result<(), RouteError> {
        let Some((Segment::Catchall { name, check: None }, parent)) = pattern.segments.split_last() else {
            return Ok(());
        };
        let Some(parent) = self.root.find_exact(parent) else {
            return Ok(());
        };
        let overlaps = |r: &Route| r.method == METHOD_ANY || methods.iter().any(|m| *m == METHOD_ANY || *m == r.method);
        let taken = parent
            .catchalls
            .iter()
            .filter(|c| c.check.is_none() && c.name != *name)
            .find(|c| c.routes.iter().any(overlaps));
        match taken {
            Some(other) => Err(RouteError::pattern(
                &pattern.path,
                format!("duplicate catchall, `*{}` already covers this path", other.name),
            )),
            None => Ok(()),
        }
    }

    pub(crate) fn match_func(&self, method: &str, path: &str, params: &mut Params) -> HandlerChain {
        let any = self.options.any_methods.iter().any(|m| m == method);
        let mut captures = Vec::new();
        let mut miss = false;
        match self.root.lookup(method, any, path, &mut captures, &mut miss) {
            Some(route) => {
                for (k, v) in route.params.iter() {
                    params.add(k, v);
                }
                for (k, v) in captures {
                    params.add(k, v);
                }
                route.chain.clone()
            }
            None if miss => self.method_not_allowed.clone(),
            None => self.not_found.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxFuture, handler_func};
    use crate::Context;

    fn tag(name: &'static str) -> HandlerChain {
        fn noop(_: &mut Context) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
        // the chain length encodes which route matched
        let len = name.len();
        handler::chain((0..len).map(|_| handler_func(noop)).collect())
    }

    fn full() -> RouteTree {
        RouteTree::new(RouterOptions::default(), Some(ValidatorRegistry::new()))
    }

    fn hit(tree: &RouteTree, method: &str, path: &str) -> (usize, Params) {
        let mut params = Params::new();
        let chain = tree.match_func(method, path, &mut params);
        (chain.len(), params)
    }

    #[test]
    fn splits_shared_prefixes() {
        let mut tree = full();
        tree.handle_func("GET", "/api/users", tag("aa")).unwrap();
        tree.handle_func("GET", "/api/uploads", tag("aaa")).unwrap();
        tree.handle_func("GET", "/api", tag("aaaa")).unwrap();
        assert_eq!(hit(&tree, "GET", "/api/users").0, 2);
        assert_eq!(hit(&tree, "GET", "/api/uploads").0, 3);
        assert_eq!(hit(&tree, "GET", "/api").0, 4);
        assert_eq!(hit(&tree, "GET", "/api/u").1.get(PARAM_ROUTE), None);
    }

    #[test]
    fn const_before_param_before_catchall() {
        let mut tree = full();
        tree.handle_func("GET", "/f/*", tag("aaaa")).unwrap();
        tree.handle_func("GET", "/f/:name", tag("aaa")).unwrap();
        tree.handle_func("GET", "/f/new", tag("aa")).unwrap();
        assert_eq!(hit(&tree, "GET", "/f/new").0, 2);
        let (n, p) = hit(&tree, "GET", "/f/old");
        assert_eq!((n, p.get("name")), (3, Some("old")));
        let (n, p) = hit(&tree, "GET", "/f/a/b");
        assert_eq!((n, p.get("*")), (4, Some("a/b")));
    }

    #[test]
    fn backtracks_into_later_branches() {
        let mut tree = full();
        tree.handle_func("GET", "/b/:x/c", tag("aa")).unwrap();
        tree.handle_func("GET", "/b/*rest", tag("aaa")).unwrap();
        assert_eq!(hit(&tree, "GET", "/b/1/c").0, 2);
        let (n, p) = hit(&tree, "GET", "/b/1/d");
        assert_eq!((n, p.get("rest"), p.get("x")), (3, Some("1/d"), None));
    }

    #[test]
    fn empty_param_value_does_not_match() {
        let mut tree = full();
        tree.handle_func("GET", "/u/:id", tag("aa")).unwrap();
        assert_eq!(hit(&tree, "GET", "/u/").1.get("id"), None);
    }

    #[test]
    fn method_miss_is_not_allowed() {
        let mut tree = full();
        tree.handle_func("GET", "/m", tag("aa")).unwrap();
        tree.handle_func("405", "/", tag("aaaaa")).unwrap();
        tree.handle_func("404", "/", tag("aaaaaa")).unwrap();
        assert_eq!(hit(&tree, "POST", "/m").0, 5);
        assert_eq!(hit(&tree, "POST", "/n").0, 6);
    }

    #[test]
    fn any_answers_configured_methods_only() {
        let mut tree = full();
        tree.handle_func("ANY", "/a", tag("aa")).unwrap();
        tree.handle_func("PUT", "/a", tag("aaa")).unwrap();
        assert_eq!(hit(&tree, "GET", "/a").0, 2);
        assert_eq!(hit(&tree, "PUT", "/a").0, 3);
        assert_eq!(hit(&tree, "OPTIONS", "/a").0, 1);
    }

    #[test]
    fn registration_params_come_first() {
        let mut tree = full();
        tree.handle_func("GET", "/p/:id action=show", tag("aa")).unwrap();
        let (_, p) = hit(&tree, "GET", "/p/7");
        assert_eq!(p.iter().collect::<Vec<_>>(), [("route", "/p/:id"), ("action", "show"), ("id", "7")]);
    }

    #[test]
    fn method_lists_register_together() {
        let mut tree = full();
        tree.handle_func("GET,POST", "/l", tag("aa")).unwrap();
        assert_eq!(hit(&tree, "POST", "/l").0, 2);
        let err = tree.handle_func("PUT,BREW", "/k", tag("aa")).unwrap_err();
        assert_eq!(err, RouteError::UnsupportedMethod { method: "BREW".into() });
        assert_eq!(hit(&tree, "PUT", "/k").0, 1);
    }

    #[test]
    fn deregisters_exact_route_only() {
        let mut tree = full();
        tree.handle_func("GET", "/x/:n|isnum", tag("aa")).unwrap();
        tree.handle_func("GET", "/x/:n|min:1", tag("aaa")).unwrap();
        tree.handle_func("GET", "/x/:n", tag("aaaa")).unwrap();
        tree.handle_func("GET", "/x/:n|isnum register=off", tag("a")).unwrap();
        assert_eq!(hit(&tree, "GET", "/x/5").0, 3);
        assert_eq!(hit(&tree, "GET", "/x/abc").0, 4);
    }

    #[test]
    fn unsupported_method_adds_nothing() {
        let mut tree = full();
        let err = tree.handle_func("BREW", "/x", tag("aa")).unwrap_err();
        assert_eq!(err, RouteError::UnsupportedMethod { method: "BREW".into() });
        assert_eq!(hit(&tree, "GET", "/x").0, 1);
    }
}
