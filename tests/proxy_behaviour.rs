mod common;

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::json;
use streamrelay::config::AppConfig;
use streamrelay::protocol::Provider;

use common::{build_state, config_for, json_request, open, post_json, send, MockUpstream};

fn unauthorized_app() -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, "{\"error\":\"bad key\"}") }),
    )
}

fn pong_app() -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"choices": [{"message": {"content": "pong"}}]})) }),
    )
}

/// Sets its flag when the upstream response body is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// SSE upstream that sends one `x` delta every 10ms until its body is dropped.
fn endless_app(produced: Arc<AtomicUsize>, dropped: Arc<AtomicBool>) -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let produced = Arc::clone(&produced);
            let flag = DropFlag(Arc::clone(&dropped));
            async move {
                let events = futures_util::stream::unfold((flag, produced), |(flag, produced)| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    produced.fetch_add(1, Ordering::SeqCst);
                    let event = bytes::Bytes::from_static(
                        b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
                    );
                    Some((Ok::<_, Infallible>(event), (flag, produced)))
                });
                ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(events)).into_response()
            }
        }),
    )
}

#[tokio::test]
async fn test_client_disconnect_abandons_upstream_stream() {
    let produced = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let upstream = MockUpstream::spawn(endless_app(Arc::clone(&produced), Arc::clone(&dropped))).await;
    let state = build_state(config_for(Provider::OpenAi, upstream.url("/v1")));

    let response = open(&state, "", json_request("/openai/stream", &json!({"query": "hi"}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.expect("first frame").expect("frame bytes");
    assert_eq!(first.as_ref(), b"{\"type\":\"delta\",\"content\":\"x\"}\n");
    drop(body);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("upstream body still being read after the client left");

    let settled = produced.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(produced.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn test_upstream_401_on_complete_is_500_with_status_in_message() {
    let upstream = MockUpstream::spawn(unauthorized_app()).await;
    let state = build_state(config_for(Provider::OpenAi, upstream.url("/v1")));

    let reply = post_json(&state, "/openai/complete", &json!({"query": "hi"})).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = reply.json()["error"].as_str().expect("error string").to_owned();
    assert!(error.contains("401"), "unexpected error: {error}");
}

#[tokio::test]
async fn test_upstream_401_on_stream_is_single_error_delta() {
    let upstream = MockUpstream::spawn(unauthorized_app()).await;
    let state = build_state(config_for(Provider::OpenAi, upstream.url("/v1")));

    let reply = post_json(&state, "/openai/stream", &json!({"query": "hi"})).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.deltas(), vec!["Error HTTP 401".to_string()]);
}

#[tokio::test]
async fn test_unreachable_upstream_before_output_is_json_error() {
    let state = build_state(config_for(
        Provider::OpenAi,
        "http://127.0.0.1:9/v1".to_string(),
    ));

    let reply = post_json(&state, "/openai/stream", &json!({"query": "hi"})).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.json()["error"].is_string());
}

#[tokio::test]
async fn test_unknown_provider_is_404() {
    let state = build_state(AppConfig::default());
    for path in ["/foo/stream", "/foo/complete"] {
        let reply = post_json(&state, path, &json!({"query": "hi"})).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.json(), json!({"error": "Unknown provider"}));
    }
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let state = build_state(AppConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/openai/complete")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("build request");
    let reply = send(&state, "", request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"].is_string());
}

#[tokio::test]
async fn test_empty_body_uses_defaults() {
    let upstream = MockUpstream::spawn(pong_app()).await;
    let state = build_state(config_for(Provider::OpenAi, upstream.url("/v1")));
    let request = Request::builder()
        .method("POST")
        .uri("/openai/complete")
        .body(Body::empty())
        .expect("build request");
    let reply = send(&state, "", request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"text": "pong"}));
}

#[tokio::test]
async fn test_body_over_limit_is_413() {
    let mut config = AppConfig::default();
    config.server.body_limit_bytes = 16;
    let state = build_state(config);
    let reply = post_json(&state, "/openai/complete", &json!({"query": "x".repeat(64)})).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(reply.json()["error"].is_string());
}

#[tokio::test]
async fn test_rate_limit_window() {
    let upstream = MockUpstream::spawn(pong_app()).await;
    let mut config = config_for(Provider::OpenAi, upstream.url("/v1"));
    config.rate_limit.enabled = true;
    config.rate_limit.window_ms = 1000;
    config.rate_limit.max_requests = 2;
    let state = build_state(config);
    let request = json!({"query": "hi"});

    assert_eq!(post_json(&state, "/openai/complete", &request).await.status, StatusCode::OK);
    assert_eq!(post_json(&state, "/openai/complete", &request).await.status, StatusCode::OK);
    let limited = post_json(&state, "/openai/complete", &request).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.json(), json!({"error": "Too many requests"}));

    let health = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build request");
    assert_eq!(send(&state, "", health).await.status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(post_json(&state, "/openai/complete", &request).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_keys_rate_limit_when_trusted() {
    let upstream = MockUpstream::spawn(pong_app()).await;
    let mut config = config_for(Provider::OpenAi, upstream.url("/v1"));
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 1;
    config.server.trust_forwarded_headers = true;
    let state = build_state(config);

    for client in ["198.51.100.1", "198.51.100.2"] {
        let request = Request::builder()
            .method("POST")
            .uri("/openai/complete")
            .header("x-forwarded-for", format!("{client}, 10.0.0.1"))
            .body(Body::from("{}"))
            .expect("build request");
        assert_eq!(send(&state, "", request).await.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_and_preflight() {
    let state = build_state(AppConfig::default());

    let health = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build request");
    let reply = send(&state, "/proxy", health).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"ok": true}));

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/proxy/openai/stream")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .expect("build request");
    let reply = send(&state, "/proxy", preflight).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(reply.headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(reply.headers.get("access-control-allow-headers").unwrap(), "content-type");
    assert!(reply.headers.get("access-control-allow-methods").is_some());
}

#[tokio::test]
async fn test_base_path_scopes_proxy_routes() {
    let upstream = MockUpstream::spawn(pong_app()).await;
    let state = build_state(config_for(Provider::OpenAi, upstream.url("/v1")));

    let scoped = Request::builder()
        .method("POST")
        .uri("/proxy/openai/complete")
        .body(Body::from("{}"))
        .expect("build request");
    assert_eq!(send(&state, "/proxy", scoped).await.status, StatusCode::OK);

    let unscoped = Request::builder()
        .method("POST")
        .uri("/openai/complete")
        .body(Body::from("{}"))
        .expect("build request");
    assert_eq!(send(&state, "/proxy", unscoped).await.status, StatusCode::NOT_FOUND);
}
