//! Application configuration.
//!
//! Everything the app reads at startup lives in one [`Config`] value that is
//! handed to [`App::new`](crate::App::new). Every field has a default, so an
//! empty TOML document is a valid configuration:
//!
//! ```toml
//! listen = ["0.0.0.0:8088"]
//! shutdown_timeout = 30
//! body_limit = 33554432
//! renderer = "json"
//! log_level = "info"
//!
//! [router]
//! kind = "full"
//! any_methods = ["GET", "POST", "PUT", "DELETE", "HEAD", "PATCH"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::context::{ContextSettings, DEFAULT_BODY_LIMIT, Renderer};
use crate::error::ConfigError;
use crate::router::{Router, RouterCoreFull, RouterCoreHost, RouterCoreRadix, RouterOptions, ValidatorRegistry};

const DEFAULT_LISTEN: &str = "0.0.0.0:8088";
const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Socket addresses to listen on.
    pub listen: Vec<String>,
    /// Seconds in-flight requests get to finish after shutdown starts.
    pub shutdown_timeout: u64,
    /// Soft limit for the cached request body, in bytes.
    pub body_limit: usize,
    /// Pins the response renderer instead of negotiating on `Accept`.
    pub renderer: Option<Renderer>,
    /// Default log filter for binaries that install a subscriber.
    pub log_level: String,
    pub router: RouterConfig,
}

/// Which router core the app builds, and its method lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub kind: RouterKind,
    #[serde(flatten)]
    pub options: RouterOptions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    Radix,
    #[default]
    Full,
    Host,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: vec![DEFAULT_LISTEN.to_owned()],
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            body_limit: DEFAULT_BODY_LIMIT,
            renderer: None,
            log_level: "info".to_owned(),
            router: RouterConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Settings every pooled request context is created with.
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings { body_limit: self.body_limit, renderer: self.renderer }
    }

    /// A fresh router over the configured core.
    pub fn build_router(&self) -> Router {
        let options = self.router.options.clone();
        match self.router.kind {
            RouterKind::Radix => Router::with_core(RouterCoreRadix::with_options(options)),
            RouterKind::Full => {
                Router::with_core(RouterCoreFull::with_validators(options, ValidatorRegistry::new()))
            }
            RouterKind::Host => Router::with_core(RouterCoreHost::with_factory(move || {
                Box::new(RouterCoreFull::with_validators(options.clone(), ValidatorRegistry::new()))
            })),
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::Invalid("`listen` must name at least one address".to_owned()));
        }
        if self.body_limit == 0 {
            return Err(ConfigError::Invalid("`body_limit` must be positive".to_owned()));
        }
        if self.router.options.all_methods.is_empty() {
            return Err(ConfigError::Invalid("`router.all_methods` must not be empty".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn reads_every_field() {
        let config = Config::from_toml_str(
            r#"
            listen = ["127.0.0.1:9000", "[::1]:9000"]
            shutdown_timeout = 5
            body_limit = 1024
            renderer = "xml"
            log_level = "debug"

            [router]
            kind = "radix"
            any_methods = ["GET"]
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.len(), 2);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.context_settings().body_limit, 1024);
        assert_eq!(config.renderer, Some(Renderer::Xml));
        assert_eq!(config.router.kind, RouterKind::Radix);
        assert_eq!(config.router.options.any_methods, vec!["GET"]);
        assert_eq!(config.router.options.all_methods, RouterOptions::default().all_methods);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(Config::from_toml_str("listen = []"), Err(ConfigError::Invalid(_))));
        assert!(matches!(Config::from_toml_str("body_limit = \"big\""), Err(ConfigError::Parse(_))));
        assert!(matches!(Config::from_toml_str("port = 80"), Err(ConfigError::Parse(_))));
        assert!(matches!(Config::from_file("/nonexistent/torii.toml"), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn radix_router_rejects_validators() {
        let config = Config::from_toml_str("[router]\nkind = \"radix\"").unwrap();
        let router = config.build_router();
        let err = router.get_func("/n/:id|isnum", |_: &mut crate::Context| {}).unwrap_err();
        assert!(matches!(err, crate::RouteError::ValidatorUnsupported { .. }));
    }
}
