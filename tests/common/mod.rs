#![allow(dead_code)]

pub mod eventstream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use streamrelay::config::AppConfig;
use streamrelay::protocol::{OutputEvent, Provider};
use streamrelay::routing::dispatch::dispatch_request;
use streamrelay::state::AppState;
use tokio::task::JoinHandle;

pub const CLIENT_ADDR: &str = "203.0.113.7:40000";

pub struct MockUpstream {
    pub addr: SocketAddr,
    server: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, server }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Config pointing `provider` at `base_url` with an inline key.
pub fn config_for(provider: Provider, base_url: String) -> AppConfig {
    let mut config = AppConfig::default();
    let settings = config.providers.get_mut(provider);
    settings.base_url = Some(base_url);
    settings.api_key = Some("upstream-secret".to_string());
    config
}

pub fn build_state(config: AppConfig) -> Arc<AppState> {
    Arc::new(AppState::from_config(config))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    /// Decode the NDJSON body into delta contents.
    pub fn deltas(&self) -> Vec<String> {
        std::str::from_utf8(&self.body)
            .expect("utf8 body")
            .lines()
            .map(|line| match serde_json::from_str::<OutputEvent>(line).expect("ndjson line") {
                OutputEvent::Delta { content } => content,
            })
            .collect()
    }
}

/// Dispatch `request` and hand back the response with its body unread.
pub async fn open(state: &Arc<AppState>, base_path: &str, request: Request<Body>) -> Response {
    dispatch_request(
        Arc::clone(state),
        Arc::<str>::from(base_path),
        Some(CLIENT_ADDR.parse().expect("client addr")),
        request,
    )
    .await
    .expect("dispatch")
}

pub async fn send(
    state: &Arc<AppState>,
    base_path: &str,
    request: Request<Body>,
) -> Reply {
    let response = open(state, base_path, request).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    Reply {
        status,
        headers,
        body,
    }
}

pub fn json_request(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize request")))
        .expect("build request")
}

pub async fn post_json(state: &Arc<AppState>, path: &str, body: &Value) -> Reply {
    send(state, "", json_request(path, body)).await
}
