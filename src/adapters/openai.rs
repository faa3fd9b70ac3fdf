use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;

use super::{
    open_stream, post_for_json, pump_lines, sse_data_line, Adapter, UpstreamCtx, UpstreamRequest,
};
use crate::error::ProxyError;
use crate::protocol::{ChatMessage, NormalizedChatRequest};
use crate::stream::DeltaSink;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `/chat/completions` body shared by OpenAI-compatible upstreams.
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionsBody<'a> {
    model: &'a str,
    messages: Cow<'a, [ChatMessage]>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
}

impl<'a> ChatCompletionsBody<'a> {
    pub(crate) fn new(ctx: &UpstreamCtx<'_>, request: &'a NormalizedChatRequest, stream: bool) -> Self {
        Self {
            model: ctx.provider.model_or_default(&request.model),
            messages: request.turns(),
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

/// Build a bearer-authenticated `{base}/chat/completions` call.
pub(crate) fn chat_completions_request(
    ctx: &UpstreamCtx<'_>,
    default_base: &str,
    request: &NormalizedChatRequest,
    stream: bool,
) -> Result<UpstreamRequest, ProxyError> {
    let url = format!("{}/chat/completions", ctx.base_url(default_base));
    let body = ChatCompletionsBody::new(ctx, request, stream);
    Ok(UpstreamRequest::json(&url, &body)?.bearer(ctx.api_key().as_deref()))
}

/// `choices[0].message.content`, trimmed.
pub(crate) fn first_choice_content(response: &Value) -> String {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned()
}

/// Stream and complete for any OpenAI-compatible chat completions upstream.
pub(crate) async fn stream_chat_completions(
    ctx: &UpstreamCtx<'_>,
    default_base: &str,
    request: &NormalizedChatRequest,
    sink: &mut DeltaSink,
) -> Result<(), ProxyError> {
    let upstream = chat_completions_request(ctx, default_base, request, true)?;
    if let Some(response) = open_stream(ctx, upstream, sink).await? {
        pump_lines(ctx.provider, response, sink, sse_data_line).await;
    }
    Ok(())
}

pub(crate) async fn complete_chat_completions(
    ctx: &UpstreamCtx<'_>,
    default_base: &str,
    request: &NormalizedChatRequest,
) -> Result<String, ProxyError> {
    let upstream = chat_completions_request(ctx, default_base, request, false)?;
    let response = post_for_json(ctx, upstream).await?;
    Ok(first_choice_content(&response))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl Adapter for OpenAiAdapter {
    async fn stream(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
        sink: &mut DeltaSink,
    ) -> Result<(), ProxyError> {
        stream_chat_completions(ctx, DEFAULT_BASE_URL, request, sink).await
    }

    async fn complete(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
    ) -> Result<String, ProxyError> {
        complete_chat_completions(ctx, DEFAULT_BASE_URL, request).await
    }
}
