use http::header::HeaderName;
use serde::Serialize;

use super::{
    join_text_parts, json_or_raw, open_stream, post_for_json, pump_lines, Adapter, LineOutcome,
    UpstreamCtx, UpstreamRequest,
};
use crate::error::ProxyError;
use crate::protocol::{NormalizedChatRequest, Role};
use crate::stream::{is_done_payload, parse_sse_data, parse_sse_event, DeltaSink};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

const MESSAGE_STOP_EVENT: &str = "message_stop";

#[derive(Debug, Serialize)]
struct MessageTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<MessageTurn<'a>>,
    stream: bool,
}

impl<'a> MessagesBody<'a> {
    /// System turns are lifted into the top-level `system` field; the
    /// Messages API only accepts `user` and `assistant` inside `messages`.
    fn new(ctx: &UpstreamCtx<'_>, request: &'a NormalizedChatRequest, stream: bool) -> Self {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();
        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(message.content.as_str()),
                role => messages.push(MessageTurn {
                    role: role.as_str(),
                    content: &message.content,
                }),
            }
        }
        if messages.is_empty() {
            messages.push(MessageTurn {
                role: Role::User.as_str(),
                content: &request.query,
            });
        }
        Self {
            model: ctx.provider.model_or_default(&request.model),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n")),
            messages,
            stream,
        }
    }
}

fn messages_request(
    ctx: &UpstreamCtx<'_>,
    request: &NormalizedChatRequest,
    stream: bool,
) -> Result<UpstreamRequest, ProxyError> {
    let url = format!("{}/messages", ctx.base_url(DEFAULT_BASE_URL));
    let version = ctx
        .settings
        .api_version
        .as_deref()
        .unwrap_or(DEFAULT_API_VERSION);
    let mut upstream = UpstreamRequest::json(&url, &MessagesBody::new(ctx, request, stream))?
        .header(HeaderName::from_static("anthropic-version"), version);
    if let Some(key) = ctx.api_key() {
        upstream = upstream.header(HeaderName::from_static("x-api-key"), &key);
    }
    Ok(upstream)
}

/// Per-call SSE state: the most recent `event:` name.
#[derive(Debug, Default)]
struct EventTracker {
    current_event: String,
}

impl EventTracker {
    fn on_line(&mut self, line: &str) -> LineOutcome {
        if let Some(event) = parse_sse_event(line) {
            self.current_event.clear();
            self.current_event.push_str(event);
            return LineOutcome::Skip;
        }
        let Some(payload) = parse_sse_data(line) else {
            return LineOutcome::Skip;
        };
        if payload.trim().is_empty() {
            return LineOutcome::Skip;
        }
        if is_done_payload(payload) || self.current_event == MESSAGE_STOP_EVENT {
            return LineOutcome::Stop;
        }
        json_or_raw(payload)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl Adapter for AnthropicAdapter {
    async fn stream(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
        sink: &mut DeltaSink,
    ) -> Result<(), ProxyError> {
        let upstream = messages_request(ctx, request, true)?;
        if let Some(response) = open_stream(ctx, upstream, sink).await? {
            let mut tracker = EventTracker::default();
            pump_lines(ctx.provider, response, sink, |line| tracker.on_line(line)).await;
        }
        Ok(())
    }

    async fn complete(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
    ) -> Result<String, ProxyError> {
        let upstream = messages_request(ctx, request, false)?;
        let response = post_for_json(ctx, upstream).await?;
        Ok(join_text_parts(response.get("content")).trim().to_owned())
    }
}
