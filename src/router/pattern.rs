//! Route pattern parsing.
//!
//! A registration path is `PATTERN[ KEY=VALUE ...]`. The pattern is a chain of
//! literal text, `:name[|check...]` params and one trailing
//! `*[name][|check...]` catchall. `:` and `*` only start a dynamic segment
//! right after a `/`; anywhere else (and every `|` inside literal text) they
//! are plain characters.

use std::fmt;

use crate::error::RouteError;
use crate::params::Params;
use crate::router::validator::{ResolveError, Validator, ValidatorRegistry};

/// Name given to an unnamed catchall.
pub(crate) const CATCHALL_NAME: &str = "*";

/// The validators attached to one dynamic segment.
#[derive(Clone)]
pub(crate) struct Check {
    /// Constraint text as written, e.g. `isnum|min:1`; two segments share a
    /// tree node only when this is identical.
    pub(crate) source: String,
    validators: Vec<Validator>,
}

impl Check {
    pub(crate) fn matches(&self, value: &str) -> bool {
        self.validators.iter().all(|v| v(value))
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Check({})", self.source)
    }
}

pub(crate) fn same_check(a: &Option<Check>, b: &Option<Check>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.source == b.source,
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Segment {
    Const(String),
    Param { name: String, check: Option<Check> },
    Catchall { name: String, check: Option<Check> },
}

/// A parsed registration path.
#[derive(Debug)]
pub(crate) struct Pattern {
    /// The pattern text without the trailing key/value pairs.
    pub(crate) path: String,
    pub(crate) segments: Vec<Segment>,
    /// The trailing `KEY=VALUE` pairs.
    pub(crate) params: Params,
}

/// Splits `raw` at the first space outside a `{...}` group.
pub(crate) fn split_pattern(raw: &str) -> (&str, &str) {
    let mut depth = 0usize;
    for (i, c) in raw.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ' ' if depth == 0 => return (&raw[..i], raw[i + 1..].trim()),
            _ => {}
        }
    }
    (raw, "")
}

impl Pattern {
    /// Parses `raw`. With no registry any constraint is rejected with
    /// [`RouteError::ValidatorUnsupported`].
    pub(crate) fn parse(raw: &str, registry: Option<&ValidatorRegistry>) -> Result<Self, RouteError> {
        let (path, kvs) = split_pattern(raw);
        if !path.starts_with('/') {
            return Err(RouteError::pattern(raw, "must start with `/`"));
        }
        let segments = parse_segments(path, registry)?;
        Ok(Self { path: path.to_owned(), segments, params: Params::parse(kvs) })
    }
}

fn parse_segments(path: &str, registry: Option<&ValidatorRegistry>) -> Result<Vec<Segment>, RouteError> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let dynamic = (c == b':' || c == b'*') && i > 0 && bytes[i - 1] == b'/';
        if !dynamic {
            i += 1;
            continue;
        }
        if literal_start < i {
            segments.push(Segment::Const(path[literal_start..i].to_owned()));
        }
        i += 1;
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'/' && bytes[i] != b'|' {
            i += 1;
        }
        let name = &path[name_start..i];
        let check_start = i;
        while i < bytes.len() && bytes[i] == b'|' {
            i = constraint_end(path, i + 1)?;
        }
        let check = build_check(path, &path[check_start..i], registry)?;

        if c == b':' {
            if name.is_empty() {
                return Err(RouteError::pattern(path, "param without a name"));
            }
            segments.push(Segment::Param { name: name.to_owned(), check });
        } else {
            if i < bytes.len() {
                return Err(RouteError::pattern(path, "catchall must be the last segment"));
            }
            let name = if name.is_empty() { CATCHALL_NAME } else { name };
            segments.push(Segment::Catchall { name: name.to_owned(), check });
        }
        literal_start = i;
    }
    if literal_start < bytes.len() {
        segments.push(Segment::Const(path[literal_start..].to_owned()));
    }
    Ok(segments)
}

/// Returns the index just past one constraint starting at `start`.
fn constraint_end(path: &str, start: usize) -> Result<usize, RouteError> {
    let bytes = path.as_bytes();
    if bytes.get(start) == Some(&b'{') {
        let mut depth = 0usize;
        for (offset, b) in bytes[start..].iter().enumerate() {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(start + offset + 1);
                    }
                }
                _ => {}
            }
        }
        return Err(RouteError::pattern(path, "unbalanced `{` in constraint"));
    }
    let mut i = start;
    while i < bytes.len() && bytes[i] != b'/' && bytes[i] != b'|' {
        i += 1;
    }
    if i == start {
        return Err(RouteError::pattern(path, "empty constraint"));
    }
    Ok(i)
}

fn build_check(
    path: &str,
    constraints: &str,
    registry: Option<&ValidatorRegistry>,
) -> Result<Option<Check>, RouteError> {
    let Some(source) = constraints.strip_prefix('|') else {
        return Ok(None);
    };
    let Some(registry) = registry else {
        return Err(RouteError::ValidatorUnsupported { pattern: path.to_owned() });
    };
    let mut validators = Vec::new();
    for spec in split_constraints(source) {
        let validator = registry.resolve(spec).map_err(|e| match e {
            ResolveError::Unknown(name) => RouteError::UnknownValidator { pattern: path.to_owned(), name },
            ResolveError::Invalid(name, reason) => {
                RouteError::InvalidValidator { pattern: path.to_owned(), name, reason }
            }
        })?;
        validators.push(validator);
    }
    Ok(Some(Check { source: source.to_owned(), validators }))
}

/// Splits `a|{x|y}|b` into `a`, `{x|y}`, `b`.
fn split_constraints(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => {
                out.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&source[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(p: &Pattern) -> Vec<String> {
        p.segments
            .iter()
            .map(|s| match s {
                Segment::Const(t) => format!("c:{t}"),
                Segment::Param { name, check } => {
                    format!("p:{name}{}", check.as_ref().map(|c| format!("|{}", c.source)).unwrap_or_default())
                }
                Segment::Catchall { name, check } => {
                    format!("*:{name}{}", check.as_ref().map(|c| format!("|{}", c.source)).unwrap_or_default())
                }
            })
            .collect()
    }

    #[test]
    fn segments_and_kvs() {
        let reg = ValidatorRegistry::new();
        let p = Pattern::parse("/api/v1/user/:id|isnum/*path action=show", Some(&reg)).unwrap();
        assert_eq!(p.path, "/api/v1/user/:id|isnum/*path");
        assert_eq!(kinds(&p), ["c:/api/v1/user/", "p:id|isnum", "c:/", "*:path"]);
        assert_eq!(p.params.get("action"), Some("show"));
    }

    #[test]
    fn literal_colon_and_bar() {
        let p = Pattern::parse("/a:b/x|y", None).unwrap();
        assert_eq!(kinds(&p), ["c:/a:b/x|y"]);
    }

    #[test]
    fn regex_constraint_with_braces_and_spaces() {
        let reg = ValidatorRegistry::new();
        let p = Pattern::parse(r"/n/:v|{\d{2}|x y} k=v", Some(&reg)).unwrap();
        assert_eq!(kinds(&p), [r"c:/n/", r"p:v|{\d{2}|x y}"]);
        assert_eq!(p.params.get("k"), Some("v"));
    }

    #[test]
    fn unnamed_catchall() {
        let p = Pattern::parse("/static/*", None).unwrap();
        assert_eq!(kinds(&p), ["c:/static/", "*:*"]);
    }

    #[test]
    fn rejects_bad_patterns() {
        let reg = ValidatorRegistry::new();
        assert!(matches!(Pattern::parse("api", None), Err(RouteError::InvalidPattern { .. })));
        assert!(matches!(Pattern::parse("/a/*x/b", None), Err(RouteError::InvalidPattern { .. })));
        assert!(matches!(Pattern::parse("/a/:", None), Err(RouteError::InvalidPattern { .. })));
        assert!(matches!(
            Pattern::parse("/a/:id|isnum", None),
            Err(RouteError::ValidatorUnsupported { .. })
        ));
        assert_eq!(
            Pattern::parse("/a/:id|bogus", Some(&reg)).unwrap_err(),
            RouteError::UnknownValidator { pattern: "/a/:id|bogus".into(), name: "bogus".into() }
        );
    }
}
