//! HTTP method vocabulary used by the router.
//!
//! The route tree keys handler chains on method *strings* so that custom
//! methods can be accepted through [`RouterOptions`](crate::router::RouterOptions).
//! [`Method`] is the typed vocabulary behind the default method lists and
//! the verb prefixes recognised on controller members.

use std::fmt;
use std::str::FromStr;

/// Registers a fallback chain served for every method in `any_methods`.
pub const METHOD_ANY: &str = "ANY";
/// Registers the chain returned when no route matches.
pub const METHOD_NOT_FOUND: &str = "404";
/// Registers the chain returned when the path matches under other methods only.
pub const METHOD_NOT_ALLOWED: &str = "405";

/// Methods an `ANY` registration serves unless configured otherwise.
pub const DEFAULT_ANY_METHODS: &[Method] = &[
    Method::Get,
    Method::Post,
    Method::Put,
    Method::Delete,
    Method::Head,
    Method::Patch,
];

/// Methods accepted at registration unless configured otherwise.
pub const DEFAULT_ALL_METHODS: &[Method] = &[
    Method::Get,
    Method::Post,
    Method::Put,
    Method::Delete,
    Method::Head,
    Method::Patch,
    Method::Options,
    Method::Connect,
    Method::Trace,
];

/// A known HTTP method: RFC 9110, WebDAV (RFC 4918 and friends) and the
/// cache-invalidation `PURGE`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Connect,
    Trace,
    Propfind,
    Proppatch,
    Mkcol,
    Copy,
    Move,
    Lock,
    Unlock,
    Mkcalendar,
    Report,
    Search,
    Purge,
}

/// Wire names, one per variant.
const NAMES: [(Method, &str); 20] = [
    (Method::Get, "GET"),
    (Method::Head, "HEAD"),
    (Method::Post, "POST"),
    (Method::Put, "PUT"),
    (Method::Delete, "DELETE"),
    (Method::Patch, "PATCH"),
    (Method::Options, "OPTIONS"),
    (Method::Connect, "CONNECT"),
    (Method::Trace, "TRACE"),
    (Method::Propfind, "PROPFIND"),
    (Method::Proppatch, "PROPPATCH"),
    (Method::Mkcol, "MKCOL"),
    (Method::Copy, "COPY"),
    (Method::Move, "MOVE"),
    (Method::Lock, "LOCK"),
    (Method::Unlock, "UNLOCK"),
    (Method::Mkcalendar, "MKCALENDAR"),
    (Method::Report, "REPORT"),
    (Method::Search, "SEARCH"),
    (Method::Purge, "PURGE"),
];

impl Method {
    pub fn as_str(self) -> &'static str {
        // variants are declared in table order
        NAMES[self as usize].1
    }

    /// Recognises a verb written in any case, as found at the start of a
    /// controller member name (`get`, `Get`, `GET`).
    ///
    /// Returns `Some(None)` for `any`, which maps to [`METHOD_ANY`].
    pub fn from_verb(word: &str) -> Option<Option<Self>> {
        if word.eq_ignore_ascii_case(METHOD_ANY) {
            return Some(None);
        }
        NAMES.iter().find(|(_, name)| name.eq_ignore_ascii_case(word)).map(|(m, _)| Some(*m))
    }

    /// The default method list rendered as owned strings.
    pub fn names(methods: &[Method]) -> Vec<String> {
        methods.iter().map(|m| m.as_str().to_owned()).collect()
    }
}

/// Wire form only: method tokens are case-sensitive.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAMES.iter().find(|(_, name)| *name == s).map(|(m, _)| *m).ok_or(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(Method::from_verb("get"), Some(Some(Method::Get)));
        assert_eq!(Method::from_verb("Post"), Some(Some(Method::Post)));
        assert_eq!(Method::from_verb("any"), Some(None));
        assert_eq!(Method::from_verb("user"), None);
    }

    #[test]
    fn wire_form_is_case_sensitive() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert!("get".parse::<Method>().is_err());
    }

    #[test]
    fn table_matches_variants() {
        for (method, name) in NAMES {
            assert_eq!(method.as_str(), name);
            assert_eq!(name.parse::<Method>(), Ok(method));
        }
    }
}
