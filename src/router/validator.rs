//! Named predicates applied to captured segments.
//!
//! A constrained segment such as `:id|isnum|min:1` admits its child only when
//! every listed validator accepts the captured value. Validators are resolved
//! when the pattern is registered, so an unknown name fails the registration
//! instead of the request.
//!
//! | Form | Meaning |
//! |---|---|
//! | `name` | a registered predicate (`isnum`, `nozero`, ...) |
//! | `name:args` | a registered factory called with `args` (`min:1`, `len:4`) |
//! | `regexp:RE` / `{RE}` | the whole value must match `RE` |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// A predicate over a captured value.
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Builds a [`Validator`] from the `args` part of `name:args`.
pub type ValidatorFactory = Arc<dyn Fn(&str) -> Result<Validator, String> + Send + Sync>;

/// Why a validator reference could not be resolved.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ResolveError {
    Unknown(String),
    Invalid(String, String),
}

/// The set of validators patterns may reference.
///
/// [`ValidatorRegistry::new`] comes with the built-ins; register more before
/// registering the patterns that use them.
#[derive(Clone)]
pub struct ValidatorRegistry {
    funcs: HashMap<String, Validator>,
    factories: HashMap<String, ValidatorFactory>,
}

impl ValidatorRegistry {
    /// A registry holding the built-in validators.
    pub fn new() -> Self {
        let mut reg = Self::empty();
        reg.register("nozero", |v| !v.is_empty() && v != "0");
        reg.register("isbool", |v| v.parse::<bool>().is_ok() || v == "0" || v == "1");
        reg.register("isnum", |v| v.parse::<i64>().is_ok());
        reg.register("isalpha", |v| !v.is_empty() && v.chars().all(|c| c.is_ascii_alphabetic()));
        reg.register("isalnum", |v| !v.is_empty() && v.chars().all(|c| c.is_ascii_alphanumeric()));
        reg.register_factory("min", |args| {
            let min = parse_bound(args)?;
            Ok(Arc::new(move |v: &str| v.parse::<i64>().is_ok_and(|n| n >= min)))
        });
        reg.register_factory("max", |args| {
            let max = parse_bound(args)?;
            Ok(Arc::new(move |v: &str| v.parse::<i64>().is_ok_and(|n| n <= max)))
        });
        reg.register_factory("len", |args| {
            let len = parse_len(args)?;
            Ok(Arc::new(move |v: &str| v.chars().count() == len))
        });
        reg.register_factory("minlen", |args| {
            let len = parse_len(args)?;
            Ok(Arc::new(move |v: &str| v.chars().count() >= len))
        });
        reg.register_factory("maxlen", |args| {
            let len = parse_len(args)?;
            Ok(Arc::new(move |v: &str| v.chars().count() <= len))
        });
        reg.register_factory("regexp", compile_regex);
        reg
    }

    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self { funcs: HashMap::new(), factories: HashMap::new() }
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.funcs.insert(name.to_owned(), Arc::new(f));
    }

    pub fn register_factory<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&str) -> Result<Validator, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Arc::new(f));
    }

    /// Resolves one reference taken from a pattern (`isnum`, `min:3`, `{\d+}`).
    pub(crate) fn resolve(&self, spec: &str) -> Result<Validator, ResolveError> {
        if let Some(re) = spec.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            return compile_regex(re).map_err(|e| ResolveError::Invalid(spec.to_owned(), e));
        }
        match spec.split_once(':') {
            Some((name, args)) => {
                let factory = self
                    .factories
                    .get(name)
                    .ok_or_else(|| ResolveError::Unknown(name.to_owned()))?;
                factory(args).map_err(|e| ResolveError::Invalid(spec.to_owned(), e))
            }
            None => self
                .funcs
                .get(spec)
                .cloned()
                .ok_or_else(|| ResolveError::Unknown(spec.to_owned())),
        }
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut funcs: Vec<_> = self.funcs.keys().collect();
        let mut factories: Vec<_> = self.factories.keys().collect();
        funcs.sort();
        factories.sort();
        f.debug_struct("ValidatorRegistry")
            .field("funcs", &funcs)
            .field("factories", &factories)
            .finish()
    }
}

fn compile_regex(re: &str) -> Result<Validator, String> {
    let re = Regex::new(&format!("^(?:{re})$")).map_err(|e| e.to_string())?;
    Ok(Arc::new(move |v: &str| re.is_match(v)))
}

fn parse_bound(args: &str) -> Result<i64, String> {
    args.trim().parse().map_err(|_| format!("`{args}` is not an integer"))
}

fn parse_len(args: &str) -> Result<usize, String> {
    args.trim().parse().map_err(|_| format!("`{args}` is not a length"))
}
