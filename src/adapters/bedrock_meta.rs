//! Meta Llama models on Bedrock runtime.
//!
//! Streaming responses are AWS event-stream frames rather than text lines,
//! so this adapter runs its own pump over [`EventStreamDecoder`] instead of
//! the shared line pump.

use std::pin::pin;
use std::time::SystemTime;

use base64::Engine as _;
use futures_util::StreamExt;
use http::header::ACCEPT;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{open_stream, post_for_text, Adapter, UpstreamCtx, UpstreamRequest};
use crate::error::ProxyError;
use crate::protocol::NormalizedChatRequest;
use crate::stream::{pick_text, DeltaSink, EventMessage, EventStreamDecoder};
use crate::transport::{sign_request, AwsCredentials};

pub const DEFAULT_REGION: &str = "us-east-1";
const BEARER_TOKEN_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";
const SIGNING_SERVICE: &str = "bedrock";
const EVENT_STREAM_ACCEPT: &str = "application/vnd.amazon.eventstream";

/// RFC 3986 unreserved characters pass through; `:` in model ids does not.
const MODEL_ID: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Serialize)]
struct InvokeBody {
    prompt: String,
    max_gen_len: u32,
    temperature: f64,
    top_p: f64,
}

fn region<'a>(ctx: &'a UpstreamCtx<'_>) -> &'a str {
    ctx.settings
        .region
        .as_deref()
        .map(str::trim)
        .filter(|region| !region.is_empty())
        .unwrap_or(DEFAULT_REGION)
}

fn invoke_url(ctx: &UpstreamCtx<'_>, model: &str, stream: bool) -> String {
    let action = if stream {
        "invoke-with-response-stream"
    } else {
        "invoke"
    };
    let default_base = format!("https://bedrock-runtime.{}.amazonaws.com", region(ctx));
    format!(
        "{}/model/{}/{action}",
        ctx.base_url(&default_base),
        utf8_percent_encode(model, MODEL_ID)
    )
}

fn bearer_token(ctx: &UpstreamCtx<'_>) -> Option<String> {
    ctx.settings
        .resolve_api_key(ctx.provider)
        .or_else(|| std::env::var(BEARER_TOKEN_ENV).ok())
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Bearer token when one is configured, SigV4 when AWS credentials are
/// present, otherwise unauthenticated. Credentials are read per call.
fn invoke_request(
    ctx: &UpstreamCtx<'_>,
    request: &NormalizedChatRequest,
    stream: bool,
) -> Result<UpstreamRequest, ProxyError> {
    let model = ctx.provider.model_or_default(&request.model);
    let body = InvokeBody {
        prompt: request.uppercase_prompt(),
        max_gen_len: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
    };
    let accept = if stream {
        EVENT_STREAM_ACCEPT
    } else {
        "application/json"
    };
    let mut upstream = UpstreamRequest::json(&invoke_url(ctx, model, stream), &body)?
        .header(ACCEPT, accept);

    if let Some(token) = bearer_token(ctx) {
        return Ok(upstream.bearer(Some(&token)));
    }
    match AwsCredentials::from_env() {
        Some(credentials) => sign_request(
            &upstream.url,
            &mut upstream.headers,
            &upstream.body,
            &credentials,
            region(ctx),
            SIGNING_SERVICE,
            SystemTime::now(),
        )?,
        None => debug!(provider = ctx.provider.as_str(), "no AWS credentials configured"),
    }
    Ok(upstream)
}

#[derive(Debug, PartialEq, Eq)]
enum FrameOutcome {
    Skip,
    Emit(String),
    /// Emit one visible error delta, then end the stream.
    Fail(String),
}

fn on_message(message: &EventMessage) -> FrameOutcome {
    match message.message_type() {
        Some("exception" | "error") => FrameOutcome::Fail(exception_text(message)),
        _ if message.event_type() == Some("chunk") => chunk_text(&message.payload)
            .filter(|text| !text.is_empty())
            .map_or(FrameOutcome::Skip, FrameOutcome::Emit),
        _ => FrameOutcome::Skip,
    }
}

/// `{"bytes": "<base64>"}` to the text it carries. Decoded bytes that are
/// not JSON are returned as-is.
fn chunk_text(payload: &[u8]) -> Option<String> {
    let envelope: Value = serde_json::from_slice(payload).ok()?;
    let encoded = envelope.get("bytes")?.as_str()?;
    let decoded = match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(error = %err, "undecodable bedrock chunk");
            return None;
        }
    };
    match serde_json::from_slice::<Value>(&decoded) {
        Ok(value) => Some(pick_text(&value)),
        Err(_) => Some(String::from_utf8_lossy(&decoded).into_owned()),
    }
}

fn exception_text(message: &EventMessage) -> String {
    let kind = message
        .header(":exception-type")
        .or_else(|| message.header(":error-code"))
        .unwrap_or("UnknownError");
    let detail = serde_json::from_slice::<Value>(&message.payload)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .or_else(|| message.header(":error-message").map(str::to_owned))
        .unwrap_or_else(|| String::from_utf8_lossy(&message.payload).into_owned());
    format!("Error {kind}: {detail}")
}

/// `generation` / `output_text` of a JSON body, or the raw text.
fn invoke_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("generation")
            .filter(|value| !value.is_null())
            .or_else(|| value.get("output_text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_owned(),
        Err(_) => body.trim().to_owned(),
    }
}

async fn pump_frames(ctx: &UpstreamCtx<'_>, response: reqwest::Response, sink: &mut DeltaSink) {
    let provider = ctx.provider.as_str();
    let mut body = pin!(response.bytes_stream());
    let mut decoder = EventStreamDecoder::new();

    loop {
        let chunk = tokio::select! {
            biased;
            () = sink.closed() => {
                debug!(provider, "client disconnected, abandoning upstream stream");
                return;
            }
            chunk = body.next() => chunk,
        };
        match chunk {
            None => break,
            Some(Err(err)) => {
                debug!(provider, error = %err.without_url(), "upstream body read failed");
                return;
            }
            Some(Ok(bytes)) => decoder.push(&bytes),
        }

        loop {
            let message = match decoder.next_message() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(err) => {
                    warn!(provider, error = %err, "corrupt event-stream frame, ending stream");
                    return;
                }
            };
            let (piece, stop) = match on_message(&message) {
                FrameOutcome::Skip => continue,
                FrameOutcome::Emit(piece) => (piece, false),
                FrameOutcome::Fail(piece) => (piece, true),
            };
            if sink.write_delta(&piece).await.is_err() {
                debug!(provider, "client disconnected");
                return;
            }
            if stop {
                return;
            }
        }
    }

    let leftover = decoder.buffered_len();
    if leftover > 0 {
        warn!(provider, bytes = leftover, "upstream stream ended inside an event-stream frame");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockMetaAdapter;

impl Adapter for BedrockMetaAdapter {
    async fn stream(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
        sink: &mut DeltaSink,
    ) -> Result<(), ProxyError> {
        let upstream = invoke_request(ctx, request, true)?;
        if let Some(response) = open_stream(ctx, upstream, sink).await? {
            pump_frames(ctx, response, sink).await;
        }
        Ok(())
    }

    async fn complete(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
    ) -> Result<String, ProxyError> {
        let upstream = invoke_request(ctx, request, false)?;
        let body = post_for_text(ctx, upstream).await?;
        Ok(invoke_text(&body))
    }
}
