//! `/{provider}/stream` and `/{provider}/complete` handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde_json::json;
use tracing::{info_span, warn, Instrument};

use crate::error::ProxyError;
use crate::observability::{log_request_complete, Operation};
use crate::protocol::event::{NDJSON_CONTENT_TYPE, NO_STORE_CACHE_CONTROL};
use crate::protocol::{normalize, ChatRequest, NormalizedChatRequest, Provider};
use crate::routing;
use crate::state::AppState;
use crate::stream::{delta_channel, DeltaReceiver, DEFAULT_SINK_CAPACITY};

fn parse_request(body: &[u8]) -> Result<NormalizedChatRequest, ProxyError> {
    ChatRequest::from_body(body).map(normalize)
}

/// Stream NDJSON deltas for one request.
///
/// The adapter runs on its own task. Status and headers are only decided
/// once the first delta arrives or the adapter finishes without one, so a
/// failure before any output still becomes a JSON error response.
pub async fn stream_handler(state: Arc<AppState>, provider: Provider, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let request_id = state.next_request_id();
    let start_time = Instant::now();
    let (mut sink, mut receiver) = delta_channel(DEFAULT_SINK_CAPACITY);

    let task_state = Arc::clone(&state);
    let span = info_span!("stream", request_id = %request_id, provider = provider.as_str());
    let adapter_task = tokio::spawn(async move {
        let ctx = task_state.upstream_ctx(provider);
        let model = provider.model_or_default(&request.model);
        let result = routing::stream(&ctx, &request, &mut sink).await;
        match &result {
            Ok(()) => log_request_complete(
                &request_id,
                provider,
                Operation::Stream,
                model,
                sink.lines_written(),
                start_time,
            ),
            Err(err) if sink.is_committed() => warn!(
                request_id = %request_id,
                provider = provider.as_str(),
                error = %err,
                "stream failed after response was committed"
            ),
            Err(_) => {}
        }
        result
    }
    .instrument(span));

    if let Some(first) = receiver.recv().await {
        return ndjson_response(receiver, Some(first));
    }

    match adapter_task.await {
        Ok(Ok(())) => ndjson_response(receiver, None),
        Ok(Err(err)) => {
            warn!(
                request_id = %request_id,
                provider = provider.as_str(),
                error = %err,
                "stream failed before any output"
            );
            err.into_response()
        }
        Err(join_err) => {
            warn!(request_id = %request_id, error = %join_err, "stream task aborted");
            ProxyError::Internal("stream task aborted".to_string()).into_response()
        }
    }
}

/// Run one non-streaming completion and answer `{"text": ...}`.
pub async fn complete_handler(state: Arc<AppState>, provider: Provider, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let request_id = state.next_request_id();
    let start_time = Instant::now();
    let ctx = state.upstream_ctx(provider);
    let span = info_span!("complete", request_id = %request_id, provider = provider.as_str());

    match routing::complete(&ctx, &request).instrument(span).await {
        Ok(text) => {
            log_request_complete(
                &request_id,
                provider,
                Operation::Complete,
                provider.model_or_default(&request.model),
                u64::try_from(text.chars().count()).unwrap_or(u64::MAX),
                start_time,
            );
            Json(json!({ "text": text })).into_response()
        }
        Err(err) => {
            warn!(
                request_id = %request_id,
                provider = provider.as_str(),
                error = %err,
                "completion failed"
            );
            err.into_response()
        }
    }
}

fn ndjson_response(receiver: DeltaReceiver, first: Option<Bytes>) -> Response {
    let mut response = Response::new(Body::from_stream(receiver.into_body_stream(first)));
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(NDJSON_CONTENT_TYPE),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static(NO_STORE_CACHE_CONTROL),
    );
    headers.insert(http::header::PRAGMA, http::HeaderValue::from_static("no-cache"));
    headers.insert(
        http::HeaderName::from_static("x-accel-buffering"),
        http::HeaderValue::from_static("no"),
    );
    response
}
