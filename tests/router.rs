use std::sync::Arc;

use http_body_util::BodyExt;
use torii::{
    App, BoxFuture, Config, Context, Params, RouteError, Router, RouterCoreHost, RouterCoreLock, RouterCoreRadix,
    RouterCore, ValidatorRegistry, chain, empty, handler_func,
};

fn noop(_: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async {})
}

/// Registers each `(method, pattern)` and checks which pattern (by its
/// `route` param) answers each request, and with which params.
macro_rules! match_tests {
    ($($name:ident {
        routes = [$(($rmethod:literal, $rpath:literal)),* $(,)?],
        $( $method:literal $path:literal => $( $(@$none:tt)? None )? $( { $( $key:literal => $val:literal ),* $(,)? } )? ),* $(,)?
    }),* $(,)?) => { $(
        #[test]
        fn $name() {
            let router = Router::new();
            $( router.add_handler($rmethod, $rpath, noop).unwrap(); )*

            $({
                let mut params = Params::new();
                router.match_func($method, $path, &mut params);
                let got: Vec<(&str, &str)> = params.iter().collect();
                $( $( @$none )?
                    assert!(got.is_empty(), "unexpected match for {} '{}': {:?}", $method, $path, got);
                )?
                $(
                    let expected: Vec<(&str, &str)> = vec![$(($key, $val)),*];
                    assert_eq!(got, expected, "wrong params for {} '{}'", $method, $path);
                )?
            })*
        }
    )* };
}

match_tests! {
    user_id {
        routes = [("GET", "/api/v1/users/:id")],
        "GET" "/api/v1/users/42" => { "route" => "/api/v1/users/:id", "id" => "42" },
        "GET" "/api/v1/users/" => None,
        "GET" "/api/v1/users/42/x" => None,
    },
    catchall_without_leading_slash {
        routes = [("GET", "/a/*rest"), ("GET", "/*")],
        "GET" "/a/b/c/d" => { "route" => "/a/*rest", "rest" => "b/c/d" },
        "GET" "/a/" => { "route" => "/a/*rest", "rest" => "" },
        "GET" "/" => { "route" => "/*", "*" => "" },
        "GET" "/other/thing" => { "route" => "/*", "*" => "other/thing" },
    },
    validators_before_fallback {
        routes = [("GET", "/x/:n|isnum"), ("GET", "/x/:n")],
        "GET" "/x/7" => { "route" => "/x/:n|isnum", "n" => "7" },
        "GET" "/x/foo" => { "route" => "/x/:n", "n" => "foo" },
    },
    regex_and_factories {
        routes = [
            ("GET", "/v/:ver|{v[0-9]+}"),
            ("GET", "/page/:n|min:1|max:100"),
            ("GET", "/code/:c|len:3"),
        ],
        "GET" "/v/v12" => { "route" => "/v/:ver|{v[0-9]+}", "ver" => "v12" },
        "GET" "/v/x12" => None,
        "GET" "/page/50" => { "route" => "/page/:n|min:1|max:100", "n" => "50" },
        "GET" "/page/0" => None,
        "GET" "/page/101" => None,
        "GET" "/code/abc" => { "route" => "/code/:c|len:3", "c" => "abc" },
        "GET" "/code/ab" => None,
    },
    const_wins_then_backtracks {
        routes = [("GET", "/files/new"), ("GET", "/files/:name/raw"), ("GET", "/files/*path")],
        "GET" "/files/new" => { "route" => "/files/new" },
        "GET" "/files/new/raw" => { "route" => "/files/:name/raw", "name" => "new" },
        "GET" "/files/new/other" => { "route" => "/files/*path", "path" => "new/other" },
    },
    registration_params_come_first {
        routes = [("GET", "/p/:id action=show tag=x")],
        "GET" "/p/9" => { "route" => "/p/:id", "action" => "show", "tag" => "x", "id" => "9" },
    },
}

#[test]
fn any_and_specific_method() {
    let router = Router::new();
    router.any_func("/", vec![handler_func(noop)]).unwrap();
    router.get_func("/", vec![handler_func(noop), handler_func(noop)]).unwrap();

    let mut params = Params::new();
    assert_eq!(router.match_func("GET", "/", &mut params).len(), 2);
    assert_eq!(router.match_func("POST", "/", &mut params).len(), 1);
}

#[test]
fn overlapping_params_keep_registration_order() {
    for (first, second) in [("/o/:a|isnum", "/o/:b|nozero"), ("/o/:b|nozero", "/o/:a|isnum")] {
        let router = Router::new();
        router.get_func(first, noop).unwrap();
        router.get_func(second, noop).unwrap();
        let mut params = Params::new();
        router.match_func("GET", "/o/5", &mut params);
        assert_eq!(params.get("route"), Some(first));
    }
}

#[test]
fn deregistration_is_exact() {
    let router = Router::new();
    router.get_func("/x/:v|isnum", noop).unwrap();
    router.get_func("/x/:v|nozero", noop).unwrap();
    router.get_func("/x/:v", noop).unwrap();
    router.get_func("/x/:v|isnum register=off", noop).unwrap();

    let mut params = Params::new();
    router.match_func("GET", "/x/5", &mut params);
    assert_eq!(params.get("route"), Some("/x/:v|nozero"));
    let mut params = Params::new();
    router.match_func("GET", "/x/0", &mut params);
    assert_eq!(params.get("route"), Some("/x/:v"));
}

#[test]
fn matching_is_deterministic() {
    let router = Router::new();
    for p in ["/d/:a", "/d/:a/*", "/d/fixed", "/d/:a|isnum/end"] {
        router.get_func(p, noop).unwrap();
    }
    for path in ["/d/1/end", "/d/x/y/z", "/d/fixed", "/d/q"] {
        let mut first = Params::new();
        let a = router.match_func("GET", path, &mut first);
        for _ in 0..10 {
            let mut again = Params::new();
            let b = router.match_func("GET", path, &mut again);
            assert!(Arc::ptr_eq(&a, &b));
            assert_eq!(first.to_string(), again.to_string());
        }
    }
}

#[test]
fn registration_errors_leave_no_trace() {
    let router = Router::new();
    let err = router.get_func("/u/:id|nosuch", noop).unwrap_err();
    assert_eq!(err, RouteError::UnknownValidator { pattern: "/u/:id|nosuch".into(), name: "nosuch".into() });
    assert!(matches!(router.get_func("/u/*a/b", noop), Err(RouteError::InvalidPattern { .. })));
    assert!(matches!(router.get_func("/u/:/b", noop), Err(RouteError::InvalidPattern { .. })));
    assert!(matches!(router.add_handler("BREW", "/u", noop), Err(RouteError::UnsupportedMethod { .. })));
    assert!(matches!(router.add_handler("GET,BREW", "/both", noop), Err(RouteError::UnsupportedMethod { .. })));

    let mut params = Params::new();
    router.match_func("GET", "/both", &mut params);
    assert!(params.is_empty());
}

#[test]
fn duplicate_catchall_is_rejected() {
    let router = Router::new();
    router.get_func("/a/*x", noop).unwrap();
    assert!(matches!(router.get_func("/a/*y", noop), Err(RouteError::InvalidPattern { .. })));
    assert!(matches!(router.any_func("/a/*z", noop), Err(RouteError::InvalidPattern { .. })));
    // another method, or the same name again, is fine
    router.post_func("/a/*y", noop).unwrap();
    router.get_func("/a/*x", noop).unwrap();

    let mut params = Params::new();
    router.match_func("GET", "/a/q", &mut params);
    assert_eq!(params.get("route"), Some("/a/*x"));
    let mut params = Params::new();
    router.match_func("POST", "/a/q", &mut params);
    assert_eq!(params.get("route"), Some("/a/*y"));
}

#[test]
fn custom_validators() {
    let mut registry = ValidatorRegistry::new();
    registry.register("even", |v| v.parse::<u32>().is_ok_and(|n| n % 2 == 0));
    let core = torii::RouterCoreFull::with_validators(Default::default(), registry);
    let router = Router::with_core(core);
    router.get_func("/e/:n|even", noop).unwrap();

    let mut params = Params::new();
    router.match_func("GET", "/e/4", &mut params);
    assert_eq!(params.get("n"), Some("4"));
    let mut params = Params::new();
    router.match_func("GET", "/e/3", &mut params);
    assert!(params.is_empty());
}

#[test]
fn radix_core_rejects_constraints() {
    let router = Router::with_core(RouterCoreRadix::new());
    assert!(matches!(router.get_func("/n/:id|isnum", noop), Err(RouteError::ValidatorUnsupported { .. })));
    router.get_func("/n/:id", noop).unwrap();
}

#[test]
fn lock_core_shared_between_threads() {
    let core = Arc::new(RouterCoreLock::new(RouterCoreRadix::new()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let core = Arc::clone(&core);
            std::thread::spawn(move || {
                core.handle_func("GET", &format!("/t{i}/:id"), chain(vec![handler_func(noop)])).unwrap();
                let mut params = Params::new();
                core.match_func("GET", &format!("/t{i}/1"), &mut params);
                params.get("id").map(str::to_owned)
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().as_deref(), Some("1"));
    }
}

async fn body_of(app: &App, method: &str, uri: &str, host: Option<&str>) -> (u16, String) {
    let mut req = http::Request::builder().method(method).uri(uri);
    if let Some(host) = host {
        req = req.header("host", host);
    }
    let res = app.handle(req.body(empty()).unwrap()).await;
    let status = res.status().as_u16();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn misses_resolve_to_404_and_405() {
    let app = App::new(Config::default());
    app.router().get_func("/only-get", "ok").unwrap();
    assert_eq!(body_of(&app, "GET", "/only-get", None).await, (200, "ok".into()));
    assert_eq!(body_of(&app, "POST", "/only-get", None).await, (405, "405 method not allowed".into()));
    assert_eq!(body_of(&app, "GET", "/missing", None).await, (404, "404 page not found".into()));
}

#[tokio::test]
async fn custom_not_found_chain() {
    let app = App::new(Config::default());
    app.router()
        .add_handler("404", "", |ctx: &mut Context| {
            ctx.write_header(http::StatusCode::NOT_FOUND);
            ctx.write_string("nothing here");
        })
        .unwrap();
    assert_eq!(body_of(&app, "GET", "/x", None).await, (404, "nothing here".into()));
}

#[tokio::test]
async fn deregistered_route_falls_to_404() {
    let app = App::new(Config::default());
    let router = app.router();
    router.get_func("/z", "z").unwrap();
    assert_eq!(body_of(&app, "GET", "/z", None).await.0, 200);
    router.get_func("/z register=off", "z").unwrap();
    assert_eq!(body_of(&app, "GET", "/z", None).await.0, 404);
}

#[tokio::test]
async fn host_routing() {
    let router = Router::with_core(RouterCoreHost::new());
    router.get_func("/", "default").unwrap();
    router.get_func("/ host=*.example.com", |ctx: &mut Context| {
        let host = ctx.get_param("host").unwrap_or_default().to_owned();
        ctx.write_string(&host);
    })
    .unwrap();
    let app = App::with_router(Config::default(), router);

    assert_eq!(body_of(&app, "GET", "/", Some("api.example.com")).await.1, "*.example.com");
    assert_eq!(body_of(&app, "GET", "/", Some("example.org")).await.1, "default");
}

#[test]
fn router_core_trait_objects() {
    let mut core: Box<dyn RouterCore> = Box::new(RouterCoreRadix::new());
    core.handle_func("GET", "/boxed", chain(vec![handler_func(noop)])).unwrap();
    let mut params = Params::new();
    assert_eq!(core.match_func("GET", "/boxed", &mut params).len(), 1);
    assert!(!core.uses_host());
}
