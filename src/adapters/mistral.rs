use super::openai::{complete_chat_completions, stream_chat_completions};
use super::{Adapter, UpstreamCtx};
use crate::error::ProxyError;
use crate::protocol::NormalizedChatRequest;
use crate::stream::DeltaSink;

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

/// Mistral speaks the OpenAI chat completions dialect at its own base URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct MistralAdapter;

impl Adapter for MistralAdapter {
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
