//! Ordered key/value parameter store.
//!
//! Every [`Context`](crate::Context) carries one. It receives, in order, the
//! default params attached to the matched route (`route`, `action`, ...), the
//! values captured by `:name`/`*name` segments, and whatever middleware
//! writes. Lookups scan linearly: a request rarely holds more than a handful
//! of params, and two parallel vectors keep the store allocation-free once the
//! pooled context has warmed up.

use std::fmt;

/// Param holding the registered path of the matched route.
pub const PARAM_ROUTE: &str = "route";
/// Param holding the request host, or the matched host pattern under host routing.
pub const PARAM_HOST: &str = "host";
/// Param naming the controller member serving the request.
pub const PARAM_ACTION: &str = "action";
/// Param naming the controller type serving the request.
pub const PARAM_CONTROLLER: &str = "controller";
/// Registration-only param: `register=off` removes the route instead of adding it.
pub const PARAM_REGISTER: &str = "register";

/// Ordered parameter list. Duplicate keys are allowed; the last one wins on read.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Params {
    keys: Vec<String>,
    vals: Vec<String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses space-separated `key=value` pairs, as written after a route path.
    ///
    /// A bare word without `=` is stored with an empty value.
    pub fn parse(kvs: &str) -> Self {
        let mut params = Self::new();
        for pair in kvs.split_ascii_whitespace() {
            match pair.split_once('=') {
                Some((k, v)) => params.add(k, v),
                None => params.add(pair, ""),
            }
        }
        params
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the value of the last entry named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.vals[i].as_str())
    }

    /// Overwrites the last entry named `key` in place, or appends it.
    pub fn set(&mut self, key: &str, val: impl Into<String>) {
        match self.position(key) {
            Some(i) => self.vals[i] = val.into(),
            None => self.add(key, val),
        }
    }

    /// Appends an entry, keeping any earlier one with the same key.
    pub fn add(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.keys.push(key.into());
        self.vals.push(val.into());
    }

    /// Removes every entry named `key`.
    pub fn remove(&mut self, key: &str) {
        let mut i = 0;
        while i < self.keys.len() {
            if self.keys[i] == key {
                self.keys.remove(i);
                self.vals.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Appends `other`, then collapses duplicate keys so each key appears
    /// once, at its first position, holding its last value.
    pub fn merge(&mut self, other: &Params) {
        self.keys.extend(other.keys.iter().cloned());
        self.vals.extend(other.vals.iter().cloned());

        let mut keys: Vec<String> = Vec::with_capacity(self.keys.len());
        let mut vals = Vec::with_capacity(self.vals.len());
        for (i, key) in self.keys.iter().enumerate() {
            if keys.contains(key) {
                continue;
            }
            let last = self.position(key).unwrap_or(i);
            keys.push(key.clone());
            vals.push(self.vals[last].clone());
        }
        self.keys = keys;
        self.vals = vals;
    }

    /// Truncates to zero length while retaining capacity.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.vals.clear();
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(String::as_str).zip(self.vals.iter().map(String::as_str))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.keys.iter().rposition(|k| k == key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.add(k, v);
        }
        params
    }
}

/// Renders as the `key=value` list accepted by [`Params::parse`].
impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
