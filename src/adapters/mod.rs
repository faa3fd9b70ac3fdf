//! Provider adapters.
//!
//! Each adapter owns its endpoint, auth headers, upstream body shape and
//! response parsing. The shared helpers here cover what every streaming
//! path does: issue the call, turn non-success into a visible error delta,
//! and pump upstream lines through a per-call line handler into the sink.

pub mod anthropic;
pub mod bedrock_meta;
pub mod cohere;
pub mod google;
pub mod mistral;
pub mod openai;

use std::future::Future;
use std::pin::pin;

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProxyError;
use crate::protocol::{NormalizedChatRequest, Provider};
use crate::stream::{
    is_done_payload, parse_sse_data, pick_text, text_stream, DeltaSink, LineBreaker,
};
use crate::transport::HttpTransport;
use crate::util::truncate_for_log;

pub use anthropic::AnthropicAdapter;
pub use bedrock_meta::BedrockMetaAdapter;
pub use cohere::CohereAdapter;
pub use google::GoogleAdapter;
pub use mistral::MistralAdapter;
pub use openai::OpenAiAdapter;

const UPSTREAM_ERROR_LOG_CHARS: usize = 512;

/// Per-call view of everything an adapter needs besides the request.
pub struct UpstreamCtx<'a> {
    pub provider: Provider,
    pub settings: &'a ProviderConfig,
    pub transport: &'a HttpTransport,
}

impl UpstreamCtx<'_> {
    /// Configured base URL without a trailing slash, or `default`.
    #[must_use]
    pub fn base_url<'s>(&'s self, default: &'s str) -> &'s str {
        self.settings
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
    }

    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        let key = self.settings.resolve_api_key(self.provider);
        if key.is_none() {
            debug!(provider = self.provider.as_str(), "no API key configured");
        }
        key
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.settings.proxy.as_deref()
    }
}

/// The two-operation contract every provider implements.
pub trait Adapter: Send + Sync {
    /// Stream deltas for `request` into `sink`. Upstream non-success is
    /// reported in-band as one error delta; `Err` only for failures before
    /// the upstream answered.
    fn stream(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
        sink: &mut DeltaSink,
    ) -> impl Future<Output = Result<(), ProxyError>> + Send;

    /// Run one non-streaming call and return the trimmed text.
    fn complete(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
    ) -> impl Future<Output = Result<String, ProxyError>> + Send;
}

/// A fully built upstream POST.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    /// JSON POST to `url` with a serialized `body`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] for an unparsable URL and
    /// [`ProxyError::Internal`] when the body fails to serialize.
    pub fn json<T: Serialize>(url: &str, body: &T) -> Result<Self, ProxyError> {
        let url = url::Url::parse(url)
            .map_err(|err| ProxyError::Config(format!("Invalid upstream URL: {err}")))?;
        Self::json_to(url, body)
    }

    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the body fails to serialize.
    pub fn json_to<T: Serialize>(url: url::Url, body: &T) -> Result<Self, ProxyError> {
        let body = serde_json::to_vec(body)
            .map_err(|err| ProxyError::Internal(format!("Failed to encode upstream body: {err}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            url,
            headers,
            body: Bytes::from(body),
        })
    }

    #[must_use]
    pub fn bearer(self, token: Option<&str>) -> Self {
        match token {
            Some(token) => self.header(AUTHORIZATION, &format!("Bearer {token}")),
            None => self,
        }
    }

    /// Set a header. Values that are not valid header text are dropped.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "dropping invalid upstream header value"),
        }
        self
    }
}

/// What a line handler wants done with one upstream line.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Skip,
    Emit(String),
    Stop,
}

/// Issue the streaming call. `Ok(None)` means there is nothing to pump:
/// either the upstream refused (an error delta was written) or the client
/// left while we waited.
pub(crate) async fn open_stream(
    ctx: &UpstreamCtx<'_>,
    request: UpstreamRequest,
    sink: &mut DeltaSink,
) -> Result<Option<reqwest::Response>, ProxyError> {
    let response = tokio::select! {
        () = sink.closed() => {
            debug!(provider = ctx.provider.as_str(), "client disconnected before upstream responded");
            return Ok(None);
        }
        response = ctx.transport.post(request.url, request.headers, request.body, ctx.proxy()) => response?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(Some(response));
    }

    log_upstream_failure(ctx.provider, status.as_u16(), response).await;
    if sink.write_delta(&format!("Error HTTP {}", status.as_u16())).await.is_err() {
        debug!(provider = ctx.provider.as_str(), "client disconnected");
    }
    Ok(None)
}

/// Feed every complete upstream line to `on_line` in order and forward
/// what it emits. Stops on [`LineOutcome::Stop`], upstream EOF, or client
/// disconnect. Local decoding state lives only in this call.
pub(crate) async fn pump_lines<F>(
    provider: Provider,
    response: reqwest::Response,
    sink: &mut DeltaSink,
    mut on_line: F,
) where
    F: FnMut(&str) -> LineOutcome + Send,
{
    // Upstream URLs may carry credentials in the query.
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(reqwest::Error::without_url));
    let mut text = pin!(text_stream(body));
    let mut breaker = LineBreaker::new();
    let mut lines = Vec::new();

    loop {
        let fragment = tokio::select! {
            biased;
            () = sink.closed() => {
                debug!(provider = provider.as_str(), "client disconnected, abandoning upstream stream");
                return;
            }
            fragment = text.next() => fragment,
        };
        let Some(fragment) = fragment else {
            break;
        };

        breaker.feed_into(&fragment, &mut lines);
        for line in lines.drain(..) {
            match on_line(&line) {
                LineOutcome::Skip => {}
                LineOutcome::Emit(piece) => {
                    if sink.write_delta(&piece).await.is_err() {
                        debug!(provider = provider.as_str(), "client disconnected");
                        return;
                    }
                }
                LineOutcome::Stop => return,
            }
        }
    }

    let leftover = breaker.remainder().len();
    if leftover > 0 {
        warn!(
            provider = provider.as_str(),
            bytes = leftover,
            "upstream stream ended without a trailing newline; partial line dropped"
        );
    }
}

/// Line handler for OpenAI-style SSE: `data:` payloads, `[DONE]` ends the stream.
pub(crate) fn sse_data_line(line: &str) -> LineOutcome {
    let Some(payload) = parse_sse_data(line) else {
        return LineOutcome::Skip;
    };
    if payload.trim().is_empty() {
        return LineOutcome::Skip;
    }
    if is_done_payload(payload) {
        return LineOutcome::Stop;
    }
    json_or_raw(payload)
}

/// Extract text from a JSON payload; a payload that is not JSON is emitted verbatim.
pub(crate) fn json_or_raw(payload: &str) -> LineOutcome {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            let piece = pick_text(&value);
            if piece.is_empty() {
                LineOutcome::Skip
            } else {
                LineOutcome::Emit(piece)
            }
        }
        Err(err) => {
            debug!(error = %err, "non-JSON upstream line, forwarding raw");
            LineOutcome::Emit(payload.to_owned())
        }
    }
}

/// Issue a non-streaming call and return the body text of a 2xx response.
pub(crate) async fn post_for_text(
    ctx: &UpstreamCtx<'_>,
    request: UpstreamRequest,
) -> Result<String, ProxyError> {
    let response = ctx
        .transport
        .post(request.url, request.headers, request.body, ctx.proxy())
        .await?;
    let status = response.status();
    if !status.is_success() {
        log_upstream_failure(ctx.provider, status.as_u16(), response).await;
        return Err(ProxyError::Upstream {
            provider: ctx.provider,
            status: status.as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|err| ProxyError::Transport(err.without_url().to_string()))
}

/// [`post_for_text`] followed by JSON decoding.
pub(crate) async fn post_for_json(
    ctx: &UpstreamCtx<'_>,
    request: UpstreamRequest,
) -> Result<Value, ProxyError> {
    let text = post_for_text(ctx, request).await?;
    serde_json::from_str(&text).map_err(|err| ProxyError::MalformedUpstream {
        provider: ctx.provider,
        message: err.to_string(),
    })
}

/// Concatenate `items[].text` strings, skipping entries without one.
pub(crate) fn join_text_parts(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

async fn log_upstream_failure(provider: Provider, status: u16, response: reqwest::Response) {
    let body = response.text().await.unwrap_or_default();
    warn!(
        provider = provider.as_str(),
        status,
        body = truncate_for_log(&body, UPSTREAM_ERROR_LOG_CHARS),
        "upstream returned non-success status"
    );
}
