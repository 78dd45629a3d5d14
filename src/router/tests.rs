use super::Router;
use crate::error::HandlerError;
use crate::handler::{HandlerOptions, RequestHandler};
use crate::request::IncomingRequest;
use crate::response::Response;
use http::Method;
use std::sync::Arc;

fn handler(template: &str, name: &str) -> Arc<RequestHandler> {
    Arc::new(
        RequestHandler::new(
            template,
            |_req: &mut IncomingRequest| -> Result<Response, HandlerError> { Ok(Response::text("x")) },
            HandlerOptions::new().name(name),
        )
        .unwrap(),
    )
}

#[test]
fn test_first_registered_match_wins() {
    let router = Router::new();
    router.add(handler("user/<username>", "generic"));
    router.add(handler("user/admin", "admin"));
    let m = router.match_request(&Method::GET, "/user/admin").unwrap();
    assert_eq!(m.handler.name(), "generic");
}

#[test]
fn test_swapping_registration_order_changes_result() {
    let router = Router::new();
    router.add(handler("user/admin", "admin"));
    router.add(handler("user/<username>", "generic"));
    let m = router.match_request(&Method::GET, "/user/admin").unwrap();
    assert_eq!(m.handler.name(), "admin");
    let m = router.match_request(&Method::GET, "/user/bob").unwrap();
    assert_eq!(m.handler.name(), "generic");
    assert_eq!(m.capture("username"), Some("bob"));
}

#[test]
fn test_no_match_returns_none() {
    let router = Router::new();
    router.add(handler("about", "about"));
    assert!(router.match_request(&Method::GET, "/contact").is_none());
}

#[test]
fn test_remove_by_identity() {
    let router = Router::new();
    let a = router.add(handler("page", "a"));
    let b = router.add(handler("page", "b"));
    assert!(router.remove(&a));
    assert!(!router.remove(&a));
    assert_eq!(router.len(), 1);
    let m = router.match_request(&Method::GET, "/page").unwrap();
    assert_eq!(m.handler.id(), b.id());
}

#[test]
fn test_clear_empties_registry() {
    let router = Router::new();
    router.add(handler("a", "a"));
    router.add(handler("b", "b"));
    router.clear();
    assert!(router.is_empty());
    assert!(router.match_request(&Method::GET, "/a").is_none());
}

#[test]
fn test_add_returns_same_handler() {
    let router = Router::new();
    let h = handler("a", "a");
    let returned = router.add(Arc::clone(&h));
    assert!(Arc::ptr_eq(&h, &returned));
}

#[test]
fn test_snapshot_survives_concurrent_write() {
    let router = Router::new();
    router.add(handler("a", "a"));
    let snapshot = router.handlers();
    router.add(handler("b", "b"));
    assert_eq!(snapshot.len(), 1);
    assert_eq!(router.len(), 2);
}
