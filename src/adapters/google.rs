use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::{
    join_text_parts, json_or_raw, open_stream, post_for_json, pump_lines, Adapter, LineOutcome,
    UpstreamCtx, UpstreamRequest,
};
use crate::error::ProxyError;
use crate::protocol::{NormalizedChatRequest, Role};
use crate::stream::DeltaSink;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const STREAM_ACTION: &str = "streamGenerateContent";
const COMPLETE_ACTION: &str = "generateContent";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<Value>,
}

/// Gemini only knows `user` and `model`.
const fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant | Role::System => "model",
    }
}

impl<'a> GenerateContentBody<'a> {
    fn new(request: &'a NormalizedChatRequest) -> Self {
        let contents = if request.messages.is_empty() {
            vec![Content {
                role: gemini_role(Role::User),
                parts: [Part { text: &request.query }],
            }]
        } else {
            request
                .messages
                .iter()
                .map(|message| Content {
                    role: gemini_role(message.role),
                    parts: [Part {
                        text: &message.content,
                    }],
                })
                .collect()
        };
        Self {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                max_output_tokens: request.max_tokens,
            },
            safety_settings: Vec::new(),
        }
    }
}

/// `{base}/models/{model}:{action}?key=...`. The model is a single
/// percent-encoded path segment. The key rides in the query and must never
/// be logged.
fn action_url(ctx: &UpstreamCtx<'_>, model: &str, action: &str) -> Result<Url, ProxyError> {
    let mut url = Url::parse(ctx.base_url(DEFAULT_BASE_URL))
        .map_err(|err| ProxyError::Config(format!("Invalid upstream URL: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| ProxyError::Config("Gemini base URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .push("models")
        .push(&format!("{model}:{action}"));
    if let Some(key) = ctx.api_key() {
        url.query_pairs_mut().append_pair("key", &key);
    }
    Ok(url)
}

fn generate_request(
    ctx: &UpstreamCtx<'_>,
    request: &NormalizedChatRequest,
    action: &str,
) -> Result<UpstreamRequest, ProxyError> {
    let model = ctx.provider.model_or_default(&request.model);
    let url = action_url(ctx, model, action)?;
    UpstreamRequest::json_to(url, &GenerateContentBody::new(request))
}

/// Each non-blank line is treated as one JSON document.
fn json_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }
    json_or_raw(line)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

impl Adapter for GoogleAdapter {
    async fn stream(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
        sink: &mut DeltaSink,
    ) -> Result<(), ProxyError> {
        let upstream = generate_request(ctx, request, STREAM_ACTION)?;
        if let Some(response) = open_stream(ctx, upstream, sink).await? {
            pump_lines(ctx.provider, response, sink, json_line).await;
        }
        Ok(())
    }

    async fn complete(
        &self,
        ctx: &UpstreamCtx<'_>,
        request: &NormalizedChatRequest,
    ) -> Result<String, ProxyError> {
        let upstream = generate_request(ctx, request, COMPLETE_ACTION)?;
        let response = post_for_json(ctx, upstream).await?;
        Ok(join_text_parts(response.pointer("/candidates/0/content/parts"))
            .trim()
            .to_owned())
    }
}
