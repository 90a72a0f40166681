//! The application shell: context pool, router and HTTP server.
//!
//! # Shutdown
//!
//! The app owns a root [`CancelSource`]. It fires on SIGTERM, Ctrl-C or an
//! explicit [`CancelSource::cancel`] on the handle returned by
//! [`App::shutdown_handle`]. Then the app:
//! 1. stops accepting on every listener,
//! 2. asks each open connection to finish its current request and close,
//! 3. waits up to `shutdown_timeout` for in-flight requests, which can
//!    observe the cancellation through [`Context::get_context`](crate::Context::get_context),
//! 4. aborts whatever is still running and returns.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::cancel::{CancelSource, CancelToken};
use crate::config::Config;
use crate::error::{BoxError, Error};
use crate::pool::ContextPool;
use crate::request::Body;
use crate::router::Router;

/// Serves a [`Router`] over HTTP/1.1 and HTTP/2.
///
/// ```rust,no_run
/// use torii::{App, Config};
///
/// #[tokio::main]
/// async fn main() -> Result<(), torii::Error> {
///     let app = App::new(Config::default());
///     app.router().get_func("/ping", "pong")?;
///     app.listen_and_serve().await
/// }
/// ```
pub struct App {
    config: Config,
    router: Router,
    pool: ContextPool,
    cancel: CancelSource,
}

impl App {
    /// An app over the router core named in `config`.
    pub fn new(config: Config) -> Self {
        let router = config.build_router();
        Self::with_router(config, router)
    }

    pub fn with_router(config: Config, router: Router) -> Self {
        let pool = ContextPool::new(config.context_settings());
        Self { config, router, pool, cancel: CancelSource::new() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The root router. Groups made from it register into the same core.
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// A handle that stops [`listen_and_serve`](Self::listen_and_serve) when cancelled.
    pub fn shutdown_handle(&self) -> CancelSource {
        self.cancel.clone()
    }

    /// Runs one request through the global chain and returns its response.
    pub async fn handle(&self, req: http::Request<Body>) -> http::Response<Full<Bytes>> {
        self.serve(req, None).await
    }

    async fn serve(&self, req: http::Request<Body>, remote_addr: Option<SocketAddr>) -> http::Response<Full<Bytes>> {
        let mut ctx = self.pool.get();
        ctx.reset(req, remote_addr, self.cancel.token());
        ctx.set_handler(-1, self.router.handlers());
        ctx.next().await;
        let res = ctx.take_response();
        self.pool.put(ctx);
        res
    }

    /// Binds every configured address and serves until shutdown.
    ///
    /// Fails only when a listener cannot be bound.
    pub async fn listen_and_serve(self) -> Result<(), Error> {
        let mut listeners = Vec::with_capacity(self.config.listen.len());
        for addr in &self.config.listen {
            let listener = TcpListener::bind(addr.as_str()).await.inspect_err(|e| {
                error!(%addr, "bind failed: {e}");
            })?;
            info!(addr = %listener.local_addr()?, "torii listening");
            listeners.push(listener);
        }

        let drain = self.config.shutdown_timeout();
        let cancel = self.cancel.clone();
        let app = Arc::new(self);
        let mut servers = JoinSet::new();
        for listener in listeners {
            servers.spawn(accept_loop(Arc::clone(&app), listener, cancel.token(), drain));
        }

        let root = cancel.token();
        tokio::select! {
            () = shutdown_signal() => {
                info!("shutdown signal received");
                cancel.cancel();
            }
            () = root.cancelled() => {
                info!("shutdown requested");
            }
        }

        while servers.join_next().await.is_some() {}
        info!("torii stopped");
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").field("config", &self.config).field("router", &self.router).finish()
    }
}

async fn accept_loop(app: Arc<App>, listener: TcpListener, token: CancelToken, drain: Duration) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => {
                info!(in_flight = tasks.len(), "draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                let app = Arc::clone(&app);
                let token = token.clone();
                tasks.spawn(connection(app, stream, remote_addr, token));
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    let drained = tokio::time::timeout(drain, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(remaining = tasks.len(), "drain window elapsed, aborting connections");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

async fn connection(app: Arc<App>, stream: tokio::net::TcpStream, remote_addr: SocketAddr, token: CancelToken) {
    let io = TokioIo::new(stream);
    let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let app = Arc::clone(&app);
        async move {
            let req = req.map(|body| body.map_err(|e| Box::new(e) as BoxError).boxed_unsync());
            Ok::<_, Infallible>(app.serve(req, Some(remote_addr)).await)
        }
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);
    let res = tokio::select! {
        res = conn.as_mut() => res,
        () = token.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = res {
        error!(peer = %remote_addr, "connection error: {e}");
    }
}

/// Resolves on SIGTERM or Ctrl-C. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
