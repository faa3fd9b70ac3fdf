use serde::Serialize;
use serde_json::Value;

use super::{
    open_stream, post_for_json, pump_lines, sse_data_line, Adapter, UpstreamCtx, UpstreamRequest,
};
use crate::error::ProxyError;
use crate::protocol::NormalizedChatRequest;
use crate::stream::DeltaSink;

pub const DEFAULT_BASE_URL: &str = "https://api.cohere.com/v1";

#[derive(Debug, Serialize)]
struct CohereChatBody<'a> {
    model: &'a str,
    message: String,
    temperature: f64,
    p: f64,
    max_tokens: u32,
    stream: bool,
}

fn chat_request(
    ctx: &UpstreamCtx<'_>,
    request: &NormalizedChatRequest,
    stream: bool,
) -> Result<UpstreamRequest, ProxyError> {
    let url = format!("{}/chat", ctx.base_url(DEFAULT_BASE_URL));
    let body = CohereChatBody {
        model: ctx.provider.model_or_default(&request.model),
        message: request.flattened_prompt(),
        temperature: request.temperature,
        p: request.top_p,
        max_tokens: request.max_tokens,
        stream,
    };
    Ok(UpstreamRequest::json(&url, &body)?.bearer(ctx.api_key().as_deref()))
}

/// `text`, or `response.text` on older response shapes.
fn response_text(response: &Value) -> String {
    response
        .get("text")
        .filter(|value| !value.is_null())
        .or_else(|| response.pointer("/response/text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CohereAdapter;

impl Adapter for CohereAdapter {
    async fn stream(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
        sink: &mut DeltaSink,
    ) -> Result<(), ProxyError> {
        let upstream = chat_request(ctx, request, true)?;
        if let Some(response) = open_stream(ctx, upstream, sink).await? {
            pump_lines(ctx.provider, response, sink, sse_data_line).await;
        }
        Ok(())
    }

    async fn complete(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
    ) -> Result<String, ProxyError> {
        let upstream = chat_request(ctx, request, false)?;
        let response = post_for_json(ctx, upstream).await?;
        Ok(response_text(&response))
    }
}
