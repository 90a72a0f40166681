//! Unified error types.

use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

/// Boxed error used by request bodies and user-provided sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by torii's fallible operations.
///
/// Routing misses are not errors: they resolve to the 404/405 chains. This
/// type covers registration failures, body handling, bind/render failures
/// and whatever a handler reports through [`Context::fatal`](crate::Context::fatal).
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("read body: {0}")]
    Body(#[source] BoxError),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("unsupported content type `{0}`")]
    UnsupportedMediaType(String),

    #[error("bind: {0}")]
    Bind(String),

    #[error("validate: {0}")]
    Validate(String),

    #[error("render: {0}")]
    Render(String),

    #[error("{0}")]
    Handler(Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Wraps an arbitrary error raised by user code.
    pub fn handler<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler(Arc::new(err))
    }

    /// A plain error message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// The status a failure response should carry when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Bind(_) | Self::Validate(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Handler(inner) => inner
                .downcast_ref::<Error>()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, Error::status),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Self::Message(msg.to_owned())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Self::Message(msg)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Raised synchronously while registering routes, middleware or controllers.
///
/// Registration is atomic: when one of these is returned, nothing was added
/// to the route tree.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("pattern `{pattern}` uses unknown validator `{name}`")]
    UnknownValidator { pattern: String, name: String },

    #[error("pattern `{pattern}` has an invalid validator `{name}`: {reason}")]
    InvalidValidator { pattern: String, name: String, reason: String },

    #[error("pattern `{pattern}` uses validators, which this router core does not support")]
    ValidatorUnsupported { pattern: String },

    #[error("method `{method}` is not accepted by the router")]
    UnsupportedMethod { method: String },

    #[error("no handler extender converts a `{type_name}` for `{path}`")]
    NoConverter { path: String, type_name: String },

    #[error("no handlers given for `{method} {path}`")]
    EmptyChain { method: String, path: String },

    #[error("controller `{controller}` member `{member}`: {reason}")]
    Controller { controller: String, member: String, reason: String },
}

impl RouteError {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern { pattern: pattern.to_owned(), reason: reason.into() }
    }
}

/// Raised while loading a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
