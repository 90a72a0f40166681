//! Structured logging bound to a request.
//!
//! Every event carries the request method, path and matched route, so a line
//! emitted deep inside a handler can be tied back to its request without the
//! handler repeating them. Extra fields ride along through [`Entry`].

use std::fmt::{self, Display};

use crate::context::Context;
use crate::error::Error;
use crate::params::PARAM_ROUTE;

#[derive(Clone, Copy)]
enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

struct Fields<'a>(&'a [(String, String)]);

impl Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl Context {
    fn emit(&self, severity: Severity, fields: &[(String, String)], msg: &dyn Display) {
        let method = self.method();
        let path = self.path();
        let route = self.get_param(PARAM_ROUTE).unwrap_or("");
        let fields = Fields(fields);
        match severity {
            Severity::Debug => tracing::debug!(method, path, route, fields = %fields, "{msg}"),
            Severity::Info => tracing::info!(method, path, route, fields = %fields, "{msg}"),
            Severity::Warn => tracing::warn!(method, path, route, fields = %fields, "{msg}"),
            Severity::Error => tracing::error!(method, path, route, fields = %fields, "{msg}"),
        }
    }

    pub fn debug(&self, msg: impl Display) {
        self.emit(Severity::Debug, &[], &msg);
    }

    pub fn info(&self, msg: impl Display) {
        self.emit(Severity::Info, &[], &msg);
    }

    pub fn warn(&self, msg: impl Display) {
        self.emit(Severity::Warn, &[], &msg);
    }

    pub fn error(&self, msg: impl Display) {
        self.emit(Severity::Error, &[], &msg);
    }

    /// Logs `err` at error level, marks the request failed and ends the chain.
    ///
    /// When nothing has been written yet the response becomes an error body
    /// with the status from [`Error::status`]. Downstream middleware observe
    /// the failure through [`Context::err`].
    pub fn fatal(&mut self, err: impl Into<Error>) {
        let err = err.into();
        self.emit(Severity::Error, &[], &err);
        self.fail(err);
    }

    /// Starts a log entry carrying one extra field.
    pub fn with_field(&mut self, key: impl Into<String>, value: impl Display) -> Entry<'_> {
        Entry { ctx: self, fields: Vec::new() }.with_field(key, value)
    }

    /// Starts a log entry carrying several extra fields.
    pub fn with_fields<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>) -> Entry<'_>
    where
        K: Into<String>,
        V: Display,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.to_string())).collect();
        Entry { ctx: self, fields }
    }
}

/// A log view over a context with attached fields.
pub struct Entry<'a> {
    ctx: &'a mut Context,
    fields: Vec<(String, String)>,
}

impl Entry<'_> {
    pub fn with_field(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn debug(self, msg: impl Display) {
        self.ctx.emit(Severity::Debug, &self.fields, &msg);
    }

    pub fn info(self, msg: impl Display) {
        self.ctx.emit(Severity::Info, &self.fields, &msg);
    }

    pub fn warn(self, msg: impl Display) {
        self.ctx.emit(Severity::Warn, &self.fields, &msg);
    }

    pub fn error(self, msg: impl Display) {
        self.ctx.emit(Severity::Error, &self.fields, &msg);
    }

    pub fn fatal(self, err: impl Into<Error>) {
        let err = err.into();
        self.ctx.emit(Severity::Error, &self.fields, &err);
        self.ctx.fail(err);
    }
}
