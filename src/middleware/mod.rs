//! Built-in middleware.
//!
//! Each item here is an ordinary handler that awaits [`Context::next`] to
//! wrap the rest of the chain. Install them globally so they also cover the
//! 404/405 chains:
//!
//! ```rust
//! use std::time::Duration;
//! use torii::{MIDDLEWARE_GLOBAL, Router, handlers, middleware};
//!
//! let mut router = Router::new();
//! router
//!     .add_middleware_with(MIDDLEWARE_GLOBAL, handlers![
//!         middleware::logger,
//!         middleware::recover,
//!         middleware::timeout(Duration::from_secs(10)),
//!     ])
//!     .unwrap();
//! ```
//!
//! [`Context::next`]: crate::Context::next

mod logger;
mod recover;
mod timeout;

pub use logger::logger;
pub use recover::recover;
pub use timeout::timeout;
