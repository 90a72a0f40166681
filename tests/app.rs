use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http_body_util::BodyExt;
use serde::Deserialize;
use torii::{
    App, BoxFuture, Config, Context, Controller, Error, MIDDLEWARE_GLOBAL, Router, controller_methods, empty, full,
    handlers, middleware,
};

async fn send(app: &App, method: &str, uri: &str) -> (u16, String) {
    let req = http::Request::builder().method(method).uri(uri).body(empty()).unwrap();
    let res = app.handle(req).await;
    let status = res.status().as_u16();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

fn mark(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        ctx.write_string("m:");
        ctx.next().await;
    })
}

#[tokio::test]
async fn user_by_id() {
    let app = App::new(Config::default());
    app.router()
        .get_func("/api/v1/users/:id", |ctx: &mut Context| {
            let id = ctx.get_param("id").unwrap_or_default().to_owned();
            ctx.write_string(&id);
        })
        .unwrap();
    assert_eq!(send(&app, "GET", "/api/v1/users/42").await, (200, "42".into()));
}

#[tokio::test]
async fn any_then_specific_method() {
    let app = App::new(Config::default());
    app.router().any_func("/", "a").unwrap();
    app.router().get_func("/", "b").unwrap();
    assert_eq!(send(&app, "GET", "/").await.1, "b");
    assert_eq!(send(&app, "POST", "/").await.1, "a");
    assert_eq!(send(&app, "OPTIONS", "/").await.0, 405);
}

#[tokio::test]
async fn group_middleware_only_inside_group() {
    let app = App::new(Config::default());
    let mut api = app.router().group("/api");
    api.add_middleware(mark).unwrap();
    api.get_func("/ping", "pong").unwrap();
    app.router().get_func("/ping", "pong").unwrap();

    assert_eq!(send(&app, "GET", "/api/ping").await.1, "m:pong");
    assert_eq!(send(&app, "GET", "/ping").await.1, "pong");
}

#[tokio::test]
async fn middleware_registered_later_does_not_reach_earlier_routes() {
    let app = App::new(Config::default());
    let mut root = app.router().clone();
    root.get_func("/early", "e").unwrap();
    root.add_middleware(mark).unwrap();
    root.get_func("/late", "l").unwrap();
    assert_eq!(send(&app, "GET", "/early").await.1, "e");
    assert_eq!(send(&app, "GET", "/late").await.1, "m:l");
}

fn strip_version(ctx: &mut Context) -> BoxFuture<'_, ()> {
    if let Some(rest) = ctx.path().strip_prefix("/v2") {
        let target = if rest.is_empty() { "/" } else { rest };
        let uri: http::Uri = target.parse().unwrap_or_default();
        ctx.request_mut().uri = uri;
        ctx.set_header("x-api-version", "2");
    }
    Box::pin(async {})
}

#[tokio::test]
async fn global_middleware_runs_before_lookup() {
    let mut app = App::new(Config::default());
    app.router().get_func("/items", "items").unwrap();
    app.router_mut().add_middleware_with(MIDDLEWARE_GLOBAL, strip_version).unwrap();

    let res = app.handle(http::Request::get("/v2/items").body(empty()).unwrap()).await;
    assert_eq!(res.status(), http::StatusCode::OK);
    assert_eq!(res.headers()["x-api-version"], "2");
    assert_eq!(send(&app, "GET", "/v2/missing").await.0, 404);
}

fn explode(_: &mut Context) {
    panic!("handler exploded");
}

#[tokio::test]
async fn global_recover_covers_panics() {
    let mut app = App::new(Config::default());
    app.router_mut()
        .add_middleware_with(MIDDLEWARE_GLOBAL, handlers![middleware::logger, middleware::recover])
        .unwrap();
    app.router().get_func("/panic", explode).unwrap();
    let (status, body) = send(&app, "GET", "/panic").await;
    assert_eq!(status, 500);
    assert!(body.contains("handler exploded"));
    assert_eq!(send(&app, "GET", "/nothing").await.0, 404);
}

fn read_then_continue(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let _ = ctx.read_body().await;
        ctx.next().await;
    })
}

#[tokio::test]
async fn failed_body_read_is_not_hidden_from_handlers() {
    let config = Config { body_limit: 4, ..Config::default() };
    let app = App::new(config);
    let mut root = app.router().clone();
    root.add_middleware(read_then_continue).unwrap();
    root.post_func("/upload", |ctx: &mut Context| {
        let len = ctx.body().len();
        ctx.write_string(&format!("body len {len}"));
    })
    .unwrap();

    let req = http::Request::post("/upload").body(full("far too long")).unwrap();
    let res = app.handle(req).await;
    assert_eq!(res.status(), http::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn timeout_middleware_sets_deadline() {
    let mut app = App::new(Config::default());
    app.router_mut()
        .add_middleware_with(MIDDLEWARE_GLOBAL, middleware::timeout(Duration::from_millis(5)))
        .unwrap();
    app.router()
        .get_func("/deadline", |ctx: &mut Context| {
            let has_deadline = ctx.get_context().deadline().is_some();
            ctx.write_string(if has_deadline { "yes" } else { "no" });
        })
        .unwrap();
    assert_eq!(send(&app, "GET", "/deadline").await.1, "yes");
}

#[derive(Clone, Default)]
struct UserController {
    greeting: &'static str,
}

#[derive(Deserialize)]
struct Rename {
    name: String,
}

impl Controller for UserController {
    fn init(&mut self, ctx: &mut Context) -> Result<(), Error> {
        if ctx.get_header("x-deny").is_some() {
            return Err(Error::Validate("denied".into()));
        }
        self.greeting = "hello";
        Ok(())
    }

    fn release(&mut self, ctx: &mut Context) -> Result<(), Error> {
        ctx.set_header("x-released", "1");
        Ok(())
    }

    fn controller_route(&self) -> Vec<(&'static str, &'static str)> {
        vec![("get_hidden", "-"), ("list_all", "GET /all")]
    }
}

impl UserController {
    fn get(&mut self, ctx: &mut Context) {
        ctx.write_string(self.greeting);
    }

    fn get_by_id(&mut self, ctx: &mut Context) -> Result<String, Error> {
        let action = ctx.get_param("action").unwrap_or_default().to_owned();
        let controller = ctx.get_param("controller").unwrap_or_default().to_owned();
        Ok(format!("{controller}.{action}:{}", ctx.get_param("id").unwrap_or_default()))
    }

    fn post_rename(&mut self, _ctx: &mut Context, input: Rename) -> Result<String, Error> {
        Ok(format!("renamed to {}", input.name))
    }

    fn get_hidden(&mut self, ctx: &mut Context) {
        ctx.write_string("hidden");
    }

    fn list_all(&mut self, ctx: &mut Context) {
        ctx.write_string("all users");
    }
}

controller_methods!(UserController { get, get_by_id, post_rename, get_hidden, list_all });

#[tokio::test]
async fn base_controller_routes() {
    let app = App::new(Config::default());
    app.router().add_controller(UserController::default()).unwrap();

    let res = app.handle(http::Request::get("/user").body(empty()).unwrap()).await;
    assert_eq!(res.headers()["x-released"], "1");
    assert_eq!(res.into_body().collect().await.unwrap().to_bytes(), "hello");

    // a `Result<String, _>` member is rendered, so JSON without an `Accept`
    assert_eq!(send(&app, "GET", "/user/7").await.1, r#""UserController.get_by_id:7""#);
    assert_eq!(send(&app, "GET", "/user/all").await.1, "all users");
    assert_eq!(send(&app, "GET", "/user/hidden").await.1, r#""UserController.get_by_id:hidden""#);

    let req = http::Request::post("/user/rename")
        .header("content-type", "application/json")
        .body(full(r#"{"name":"zed"}"#))
        .unwrap();
    let res = app.handle(req).await;
    assert_eq!(res.into_body().collect().await.unwrap().to_bytes(), r#""renamed to zed""#);

    let req = http::Request::get("/user").header("x-deny", "1").body(empty()).unwrap();
    let res = app.handle(req).await;
    assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
    assert!(res.headers().get("x-released").is_none());
}

#[tokio::test]
async fn controllers_mount_under_groups() {
    let app = App::new(Config::default());
    app.router().group("/admin").add_controller(UserController::default()).unwrap();
    assert_eq!(send(&app, "GET", "/admin/user").await.1, "hello");
    assert_eq!(send(&app, "GET", "/user").await.0, 404);
}

#[derive(Clone)]
struct TallyController {
    label: &'static str,
    calls: usize,
}

impl Controller for TallyController {}

impl TallyController {
    fn get(&mut self, ctx: &mut Context) {
        self.calls += 1;
        ctx.write_string(&format!("{}:{}", self.label, self.calls));
    }
}

controller_methods!(TallyController { get });

#[tokio::test]
async fn base_controller_starts_from_the_registered_value() {
    let app = App::new(Config::default());
    app.router().add_controller(TallyController { label: "tally", calls: 0 }).unwrap();
    assert_eq!(send(&app, "GET", "/tally").await.1, "tally:1");
    assert_eq!(send(&app, "GET", "/tally").await.1, "tally:1");
}

struct CounterController {
    hits: Arc<AtomicUsize>,
    seen: usize,
}

impl Controller for CounterController {
    fn group(&self) -> String {
        "count".to_owned()
    }
}

impl CounterController {
    fn post(&mut self, _ctx: &mut Context) -> Result<usize, Error> {
        self.seen += 1;
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(self.seen)
    }
}

controller_methods!(CounterController { post });

#[tokio::test]
async fn singleton_controller_keeps_state() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = App::new(Config::default());
    app.router()
        .add_controller_singleton(CounterController { hits: Arc::clone(&hits), seen: 0 })
        .unwrap();
    assert_eq!(send(&app, "POST", "/count").await.1, "1");
    assert_eq!(send(&app, "POST", "/count").await.1, "2");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[derive(Clone)]
struct StrictController;

impl Controller for StrictController {
    fn controller_route(&self) -> Vec<(&'static str, &'static str)> {
        vec![("get", "GET /:id|isnum")]
    }
}

impl StrictController {
    fn get(&mut self, _ctx: &mut Context) {}
}

controller_methods!(StrictController { get });

#[test]
fn controller_errors_name_the_member() {
    let router = Router::with_core(torii::RouterCoreRadix::new());
    let err = router.add_controller(StrictController).unwrap_err();
    assert!(matches!(
        err,
        torii::RouteError::Controller { ref controller, ref member, .. }
            if controller == "StrictController" && member == "get"
    ));
}

#[tokio::test]
async fn config_picks_the_router_core() {
    let config = Config::from_toml_str("[router]\nkind = \"host\"").unwrap();
    let app = App::new(config);
    app.router().get_func("/ host=*.test", "hosted").unwrap();
    app.router().get_func("/", "plain").unwrap();

    let req = http::Request::get("/").header("host", "a.test").body(empty()).unwrap();
    let res = app.handle(req).await;
    assert_eq!(res.into_body().collect().await.unwrap().to_bytes(), "hosted");
    assert_eq!(send(&app, "GET", "/").await.1, "plain");
}
