mod common;

use common::*;
use portfolio::router::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

// ========== Response struct (JSON, HTML) ==========

#[test]
fn test_response_ok() {
    let resp = Response::ok("hello world");
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "hello world");
    assert!(resp.headers.is_empty());
}

#[test]
fn test_response_html_sets_content_type() {
    let resp = Response::html("<p>hi</p>");
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        resp.headers.get("Content-Type").unwrap(),
        "text/html; charset=utf-8"
    );
}

#[test]
fn test_response_json_success() {
    let mut headers = HashMap::new();
    headers.insert("X-Test".into(), "yes".into());
    let resp = Response::json(json!({"foo": "bar"}), 201, headers);
    assert_eq!(resp.status_code, 201);
    assert_eq!(
        resp.headers.get("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert_eq!(resp.headers.get("X-Test").unwrap(), "yes");
    assert!(resp.body.contains("\"foo\":\"bar\""));
}

use serde::{Serialize, Serializer};

struct AlwaysFailsSerialize;

impl Serialize for AlwaysFailsSerialize {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Err(serde::ser::Error::custom("Forced failure"))
    }
}

#[test]
fn test_response_json_error_branch_always_fails() {
    let resp = Response::json(AlwaysFailsSerialize, 200, HashMap::new());
    assert_eq!(resp.status_code, 500);
    assert!(resp.body.contains("Serialization failed"));
}

#[test]
fn test_status_text_variants() {
    assert_eq!(status_text(200), "OK");
    assert_eq!(status_text(403), "Forbidden");
    assert_eq!(status_text(413), "Payload Too Large");
    assert_eq!(status_text(590), "Unknown");
}

#[test]
fn test_head_response_keeps_length_without_content() {
    let raw = serialize_response(&Response::ok("héllo").without_body());
    let text = String::from_utf8(raw).unwrap();
    assert!(text.contains("Content-Length: 6\r\n"));
    assert_eq!(text.matches("Content-Length").count(), 1);
    assert!(text.ends_with("\r\n\r\n"));
}

#[test]
fn test_serialize_response_adds_length_and_close() {
    let raw = serialize_response(&Response::ok("héllo"));
    let text = String::from_utf8(raw).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Length: 6\r\n"));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with("\r\n\r\nhéllo"));
}

// ========== Path matching ==========

#[test]
fn test_static_and_param_matching() {
    assert!(match_path("/foo/", "/foo/").is_some());
    let params = match_path("/admin/:model/:id/", "/admin/book/42/").unwrap();
    assert_eq!(params.get("model").unwrap(), "book");
    assert_eq!(params.get("id").unwrap(), "42");
    assert!(match_path("/foo/bar", "/foo/bar/qux").is_none());
    assert!(match_path("/foo/:id", "/bar/99").is_none());
    assert!(match_path("/static/:dir/:file", "/static//x.css").is_none());
}

// ========== Request parsing ==========

#[tokio::test]
async fn test_read_request_with_body_and_query() {
    let mut input: &[u8] = b"POST /contact/?a=1&b=two%20words HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
    let request = read_request(&mut input).await.unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "/contact/");
    assert_eq!(request.query_param("b"), Some("two words"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.body, b"{\"a\":1}");
}

#[tokio::test]
async fn test_read_request_limits() {
    let head = format!(
        "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        MAX_BODY_BYTES + 1
    );
    let mut input = head.as_bytes();
    assert!(matches!(
        read_request(&mut input).await,
        Err(ReadError::TooLarge)
    ));

    let huge = format!("GET / HTTP/1.1\r\nX-Pad: {}\r\n", "a".repeat(MAX_HEAD_BYTES + 10));
    let mut input = huge.as_bytes();
    assert!(matches!(
        read_request(&mut input).await,
        Err(ReadError::TooLarge)
    ));

    let mut input: &[u8] = b"NONSENSE\r\n\r\n";
    assert!(matches!(
        read_request(&mut input).await,
        Err(ReadError::Malformed)
    ));
}

#[test]
fn test_url_decode_and_query() {
    assert_eq!(url_decode("a%2Fb+c"), "a/b c");
    assert_eq!(url_decode("100%"), "100%");
    let query = parse_query("category=technical&empty=&flag");
    assert_eq!(query.get("category").unwrap(), "technical");
    assert_eq!(query.get("empty").unwrap(), "");
    assert_eq!(query.get("flag").unwrap(), "");
}

#[test]
fn test_request_target_decoding() {
    let request = Request::new(Method::Get, "/books/a+b%20c/?token=a%2Bb%26c&q=caf%C3%A9+bar");
    assert_eq!(request.path, "/books/a+b c/");
    assert_eq!(request.query.get("token").unwrap(), "a+b&c");
    assert_eq!(request.query.get("q").unwrap(), "café bar");
}

// ========== Dispatch with middleware ==========

async fn echo_param(request: Request, _state: AppState) -> Response {
    Response::ok(request.params.get("who").cloned().unwrap_or_default())
}

async fn hello(_request: Request, _state: AppState) -> Response {
    Response::ok("hello")
}

#[tokio::test]
async fn test_dispatch_routes_and_methods() {
    let (state, _mailer) = memory_state().await;
    let mut router = Router::new();
    portfolio::route!(router,
        Get "/hi/:who" => { echo_param },
        Post "/only-post/" => { hello },
    );
    router.set_app_state(state);

    let resp = router.dispatch(Request::new(Method::Get, "/hi/ferris")).await;
    assert_eq!(resp.body, "ferris");

    let resp = router.dispatch(Request::new(Method::Head, "/hi/ferris")).await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.is_empty());
    assert_eq!(resp.headers.get("Content-Length").unwrap(), "6");

    let resp = router.dispatch(Request::new(Method::Get, "/only-post/")).await;
    assert_eq!(resp.status_code, 405);

    let resp = router.dispatch(Request::new(Method::Get, "/missing/")).await;
    assert_eq!(resp.status_code, 404);
}

#[tokio::test]
async fn test_dispatch_without_state_is_server_error() {
    let mut router = Router::new();
    portfolio::route!(router, Get "/" => { hello });
    let resp = router.dispatch(Request::new(Method::Get, "/")).await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_middleware_and_post_middleware_order() {
    let (state, _mailer) = memory_state().await;
    let before: Middleware = Arc::new(|ctx| {
        if ctx.path == "/blocked" {
            Some(Response::forbidden("block"))
        } else {
            None
        }
    });
    let mut router = Router::new();
    router.add_middleware(before);
    router.add_post_middleware(Arc::new(|_ctx, mut r| {
        r.body.push('1');
        r
    }));
    router.add_post_middleware(Arc::new(|_ctx, mut r| {
        r.body.push('2');
        r
    }));
    portfolio::route!(router,
        Get "/blocked" => { hello },
        Get "/open" => { hello },
    );
    router.set_app_state(state);

    let resp = router.dispatch(Request::new(Method::Get, "/blocked")).await;
    assert_eq!(resp.status_code, 403);
    assert_eq!(resp.body, "block12");

    let resp = router.dispatch(Request::new(Method::Get, "/open")).await;
    assert_eq!(resp.body, "hello12");

    // Post-middleware also sees unmatched routes.
    let resp = router.dispatch(Request::new(Method::Get, "/nowhere")).await;
    assert_eq!(resp.body, "404 Not Found12");
}

#[tokio::test]
async fn test_route_middleware_can_rewrite_params() {
    let (state, _mailer) = memory_state().await;
    let mut router = Router::new();
    let overwrite: Middleware = Arc::new(|ctx| {
        ctx.params.insert("who".to_string(), "overridden".to_string());
        None
    });
    portfolio::route!(router, Get "/hi/:who" => { echo_param, overwrite });
    router.set_app_state(state);

    let resp = router.dispatch(Request::new(Method::Get, "/hi/tomato")).await;
    assert_eq!(resp.body, "overridden");
}

#[test]
fn test_authenticate_middleware() {
    let auth = authenticate(Some("secret".to_string()));

    let mut ctx = RequestContext::for_request(
        &Request::new(Method::Get, "/admin/").with_header("Authorization", "Bearer secret"),
    );
    assert!(auth(&mut ctx).is_none());
    assert!(ctx.is_authenticated);
    assert!(require_admin()(&mut ctx).is_none());

    let mut ctx = RequestContext::for_request(&Request::new(Method::Get, "/admin/?token=nope"));
    auth(&mut ctx);
    assert!(!ctx.is_authenticated);
    let denied = require_admin()(&mut ctx).unwrap();
    assert_eq!(denied.status_code, 403);

    let disabled = authenticate(None);
    let mut ctx = RequestContext::for_request(&Request::new(Method::Get, "/admin/?token="));
    disabled(&mut ctx);
    assert!(!ctx.is_authenticated);
}

#[test]
fn test_request_timer_stamps_start() {
    let mut ctx = RequestContext::for_request(&Request::new(Method::Get, "/"));
    assert!(ctx.start_time.is_none());
    request_timer()(&mut ctx);
    assert!(ctx.start_time.is_some());
    let resp = access_log()(&ctx, Response::ok("x"));
    assert_eq!(resp.body, "x");
}
