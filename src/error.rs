use axum::response::{IntoResponse, Response};

use crate::protocol::Provider;

/// Error type shared by adapters, routing and handlers.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Unknown provider")]
    UnknownProvider,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request body too large (max {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    #[error("{} HTTP {status}", .provider.label())]
    Upstream { provider: Provider, status: u16 },
    #[error("{} returned an undecodable response: {message}", .provider.label())]
    MalformedUpstream { provider: Provider, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            ProxyError::UnknownProvider => http::StatusCode::NOT_FOUND,
            ProxyError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => http::StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::RateLimited => http::StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Upstream { .. }
            | ProxyError::MalformedUpstream { .. }
            | ProxyError::Transport(_)
            | ProxyError::Config(_)
            | ProxyError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body sent to clients: `{"error": "<message>"}`.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<crate::protocol::UnknownProvider> for ProxyError {
    fn from(_: crate::protocol::UnknownProvider) -> Self {
        ProxyError::UnknownProvider
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.body())).into_response()
    }
}
