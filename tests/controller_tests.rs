use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::Method;
use regex::Regex;

use corroute::context::RouteContext;
use corroute::controller::{ControllerRoute, OperationMeta};
use corroute::error::RoutingError;
use corroute::middleware::Handler;
use corroute::packet::Packet;

use tracing_util::TestTracing;

fn op(name: &str, verb: Method, route: &str) -> OperationMeta {
    let tag = name.to_string();
    OperationMeta {
        name: name.to_string(),
        verb,
        route: route.to_string(),
        regex: None,
        invoke: Arc::new(move |ctx: &mut RouteContext| {
            ctx.respond(Packet::request("").with_payload(serde_json::json!(tag)));
            Ok(())
        }),
    }
}

fn ctx_for(address: &str, verb: Option<&str>) -> RouteContext {
    let mut packet = Packet::request(address);
    if let Some(v) = verb {
        packet = packet.with_header("method", v);
    }
    RouteContext::new(packet)
}

fn responded_tag(ctx: &RouteContext) -> Option<&str> {
    ctx.response
        .as_ref()
        .and_then(|p| p.payload.as_ref())
        .and_then(|v| v.as_str())
}

#[test]
fn test_dispatch_by_verb_and_route() {
    let ctrl = ControllerRoute::new(
        "/items",
        vec![
            op("list", Method::GET, "/"),
            op("create", Method::POST, "/"),
        ],
    );

    let mut ctx = ctx_for("/items/", None);
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(responded_tag(&ctx), Some("list"));

    let mut ctx = ctx_for("/items/", Some("post"));
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(responded_tag(&ctx), Some("create"));
}

#[test]
fn test_shortest_declared_route_checked_first() {
    let _t = TestTracing::init();
    // Declared longest-first; the scan still checks /a before /a/:id.
    let ctrl = ControllerRoute::new(
        "/c",
        vec![op("by_id", Method::GET, "/a/:id"), op("all", Method::GET, "/a")],
    );

    let mut ctx = ctx_for("/c/a", None);
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(responded_tag(&ctx), Some("all"));

    let mut ctx = ctx_for("/c/a/7", None);
    assert!(matches!(
        ctrl.dispatch(&mut ctx),
        Err(RoutingError::NotFound { .. })
    ));
}

#[test]
fn test_regex_route_matches_subpath() {
    let mut meta = op("by_id", Method::GET, "/a/:id");
    meta.regex = Some(Regex::new(r"^/a/[^/]+$").unwrap());
    let ctrl = ControllerRoute::new("/c", vec![meta]);

    let mut ctx = ctx_for("/c/a/7", None);
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(responded_tag(&ctx), Some("by_id"));
    assert_eq!(ctx.get_param("id"), Some("7"));
}

#[test]
fn test_verb_mismatch_is_not_found() {
    let ctrl = ControllerRoute::new("/items", vec![op("list", Method::GET, "/")]);

    let mut ctx = ctx_for("/items/", Some("delete"));
    assert!(matches!(
        ctrl.dispatch(&mut ctx),
        Err(RoutingError::NotFound { .. })
    ));
}

#[test]
fn test_handlers_built_lazily_and_cached() {
    let ctrl = ControllerRoute::new(
        "/items",
        vec![op("list", Method::GET, "/"), op("create", Method::POST, "/")],
    );
    assert_eq!(ctrl.built_handlers(), 0);

    for _ in 0..3 {
        let mut ctx = ctx_for("/items/", None);
        ctrl.dispatch(&mut ctx).unwrap();
    }
    assert_eq!(ctrl.built_handlers(), 1);

    let mut ctx = ctx_for("/items/", Some("post"));
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(ctrl.built_handlers(), 2);
}

#[test]
fn test_interceptors_run_before_operation() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let o = Arc::clone(&order);
    let first = Handler::from_fn(move |_ctx| {
        o.lock().unwrap().push("first");
        Ok(())
    });
    let o = Arc::clone(&order);
    let second = Handler::from_fn(move |_ctx| {
        o.lock().unwrap().push("second");
        Ok(())
    });

    let o = Arc::clone(&order);
    let meta = OperationMeta {
        name: "run".to_string(),
        verb: Method::GET,
        route: "/run".to_string(),
        regex: None,
        invoke: Arc::new(move |ctx: &mut RouteContext| {
            o.lock().unwrap().push("op");
            ctx.finish();
            Ok(())
        }),
    };

    let ctrl = ControllerRoute::new("/c", vec![meta]).with_interceptors(vec![first, second]);

    let mut ctx = ctx_for("/c/run", None);
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "op"]);
}

#[test]
fn test_interceptor_can_short_circuit_operation() {
    let invoked = Arc::new(AtomicUsize::new(0));

    let gate = Handler::from_fn(|ctx| {
        ctx.respond(Packet::request("").with_payload(serde_json::json!("denied")));
        Ok(())
    });

    let i = Arc::clone(&invoked);
    let meta = OperationMeta {
        name: "run".to_string(),
        verb: Method::GET,
        route: "/run".to_string(),
        regex: None,
        invoke: Arc::new(move |_ctx: &mut RouteContext| {
            i.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    };

    let ctrl = ControllerRoute::new("/c", vec![meta]).with_interceptors(vec![gate]);

    let mut ctx = ctx_for("/c/run", None);
    ctrl.dispatch(&mut ctx).unwrap();
    assert_eq!(responded_tag(&ctx), Some("denied"));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[test]
fn test_destroyed_controller_refuses_dispatch() {
    let ctrl = ControllerRoute::new("/items", vec![op("list", Method::GET, "/")]);
    ctrl.destroy();

    let mut ctx = ctx_for("/items/", None);
    assert_eq!(ctrl.dispatch(&mut ctx), Err(RoutingError::Destroyed));
}
