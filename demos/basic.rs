//! Minimal torii example: JSON endpoints, a controller and graceful shutdown.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic [config.toml]
//!
//! Try:
//!   curl http://localhost:8088/api/users/42
//!   curl -X POST http://localhost:8088/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl http://localhost:8088/status/uptime
//!   curl http://localhost:8088/healthz

use std::process::ExitCode;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use torii::{App, Config, Context, Controller, Error, MIDDLEWARE_GLOBAL, controller_methods, handlers, middleware};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
}

// GET /api/users/:id
fn get_user(ctx: &mut Context) -> Result<User, Error> {
    let id = ctx.get_param("id").unwrap_or_default().to_owned();
    Ok(User { id, name: "alice".to_owned() })
}

// POST /api/users
fn create_user(ctx: &mut Context, input: NewUser) -> Result<User, Error> {
    ctx.write_header(http::StatusCode::CREATED);
    ctx.set_header("location", "/api/users/99");
    Ok(User { id: "99".to_owned(), name: input.name })
}

#[derive(Clone)]
struct StatusController {
    started: Instant,
}

impl Controller for StatusController {}

impl StatusController {
    // GET /status/uptime
    fn get_uptime(&mut self, _ctx: &mut Context) -> Result<String, Error> {
        Ok(format!("{}s", self.started.elapsed().as_secs()))
    }
}

controller_methods!(StatusController { get_uptime });

fn load_config() -> Result<Config, torii::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

fn build(app: &mut App) -> Result<(), Error> {
    let router = app.router_mut();
    router.add_middleware_with(MIDDLEWARE_GLOBAL, handlers![
        middleware::logger,
        middleware::recover,
        middleware::timeout(Duration::from_secs(10)),
    ])?;

    router.get_func("/healthz", "ok")?;
    router.add_controller_singleton(StatusController { started: Instant::now() })?;

    let api = router.group("/api");
    api.get_func("/users/:id|isnum", get_user)?;
    api.post_func("/users", create_user)?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut app = App::new(config);
    if let Err(e) = build(&mut app) {
        tracing::error!("register routes: {e}");
        return ExitCode::FAILURE;
    }

    match app.listen_and_serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
