use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::api::{health, proxy};
use crate::error::ProxyError;
use crate::protocol::Provider;
use crate::routing::rate_limit::client_key;
use crate::state::AppState;

const HEALTH_PATH: &str = "/health";
const CORS_ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const CORS_DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Which proxy operation a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOp {
    Stream,
    Complete,
}

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch<'a> {
    Health,
    Proxy { provider: &'a str, op: ProxyOp },
    Preflight,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request. `remote_addr` is the TCP peer and keys
/// rate limiting unless forwarded headers are trusted.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    remote_addr: Option<SocketAddr>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let cors = state.config.server.cors_allow_any_origin;
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref(), cors);
    let add_cors = cors && matches!(route, RouteMatch::Proxy { .. });

    let response = match route {
        RouteMatch::Health => health::health_handler().into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::Preflight => return Ok(preflight_response(&parts.headers)),
        RouteMatch::Proxy { provider, op } => {
            proxy_route(&state, remote_addr, &parts.headers, provider, op, body).await
        }
    };

    Ok(if add_cors {
        with_cors(response)
    } else {
        response
    })
}

async fn proxy_route(
    state: &Arc<AppState>,
    remote_addr: Option<SocketAddr>,
    headers: &HeaderMap,
    provider: &str,
    op: ProxyOp,
    body: Body,
) -> Response {
    if let Some(limiter) = state.rate_limiter() {
        let key = client_key(
            headers,
            remote_addr,
            state.config.server.trust_forwarded_headers,
        );
        if !limiter.check(&key) {
            debug!(client = %key, "rate limit exceeded");
            return ProxyError::RateLimited.into_response();
        }
    }

    let provider = match provider.parse::<Provider>() {
        Ok(provider) => provider,
        Err(err) => return ProxyError::from(err).into_response(),
    };

    let body_bytes = match read_request_body(body, state.config.server.body_limit_bytes).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    match op {
        ProxyOp::Stream => proxy::stream_handler(Arc::clone(state), provider, body_bytes).await,
        ProxyOp::Complete => proxy::complete_handler(Arc::clone(state), provider, body_bytes).await,
    }
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, limit)
        .await
        .map_err(|_| ProxyError::PayloadTooLarge { limit }.into_response())
}

fn preflight_response(request_headers: &HeaderMap) -> Response {
    let allow_headers = request_headers
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(CORS_DEFAULT_ALLOW_HEADERS));
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

fn with_cors(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn match_route<'a>(method: &Method, path: &'a str, base_path: &str, cors: bool) -> RouteMatch<'a> {
    if path == HEALTH_PATH {
        return if method == Method::GET {
            RouteMatch::Health
        } else {
            RouteMatch::MethodNotAllowed
        };
    }

    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };
    let Some((provider, op)) = split_proxy_path(path) else {
        return RouteMatch::NotFound;
    };

    if method == Method::POST {
        RouteMatch::Proxy { provider, op }
    } else if method == Method::OPTIONS && cors {
        RouteMatch::Preflight
    } else {
        RouteMatch::MethodNotAllowed
    }
}

/// `/{provider}/stream` or `/{provider}/complete`.
fn split_proxy_path(path: &str) -> Option<(&str, ProxyOp)> {
    let rest = path.strip_prefix('/')?;
    let (provider, op) = rest.split_once('/')?;
    if provider.is_empty() {
        return None;
    }
    let op = match op {
        "stream" => ProxyOp::Stream,
        "complete" => ProxyOp::Complete,
        _ => return None,
    };
    Some((provider, op))
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_proxy_routes() {
        assert_eq!(
            match_route(&Method::POST, "/openai/stream", "", true),
            RouteMatch::Proxy {
                provider: "openai",
                op: ProxyOp::Stream
            }
        );
        assert_eq!(
            match_route(&Method::POST, "/proxy/bedrock-meta/complete", "/proxy", true),
            RouteMatch::Proxy {
                provider: "bedrock-meta",
                op: ProxyOp::Complete
            }
        );
        assert_eq!(
            match_route(&Method::POST, "/nope/stream", "", true),
            RouteMatch::Proxy {
                provider: "nope",
                op: ProxyOp::Stream
            }
        );
    }

    #[test]
    fn test_match_other_routes() {
        assert_eq!(match_route(&Method::GET, "/health", "/proxy", true), RouteMatch::Health);
        assert_eq!(match_route(&Method::POST, "/health", "", true), RouteMatch::MethodNotAllowed);
        assert_eq!(match_route(&Method::OPTIONS, "/openai/stream", "", true), RouteMatch::Preflight);
        assert_eq!(
            match_route(&Method::OPTIONS, "/openai/stream", "", false),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(match_route(&Method::GET, "/openai/stream", "", true), RouteMatch::MethodNotAllowed);
        assert_eq!(match_route(&Method::POST, "/openai/chat", "", true), RouteMatch::NotFound);
        assert_eq!(match_route(&Method::POST, "/openai/stream", "/proxy", true), RouteMatch::NotFound);
        assert_eq!(match_route(&Method::POST, "//stream", "", true), RouteMatch::NotFound);
    }

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("proxy/"), "/proxy");
        assert_eq!(normalize_base_path(" /proxy "), "/proxy");
    }

    #[test]
    fn test_strip_base_path_requires_segment_boundary() {
        assert_eq!(strip_base_path("/proxy/x", "/proxy"), Some("/x"));
        assert_eq!(strip_base_path("/proxy", "/proxy"), Some("/"));
        assert_eq!(strip_base_path("/proxyx", "/proxy"), None);
    }
}
