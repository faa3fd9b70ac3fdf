//! Provider registry and request routing.
//!
//! The registry is a closed `match` over [`Provider`]: adding a provider
//! means one adapter module plus one arm in each function below.

pub mod dispatch;
pub mod rate_limit;

use crate::adapters::{
    Adapter, AnthropicAdapter, BedrockMetaAdapter, CohereAdapter, GoogleAdapter, MistralAdapter,
    OpenAiAdapter, UpstreamCtx,
};
use crate::error::ProxyError;
use crate::protocol::{NormalizedChatRequest, Provider};
use crate::stream::DeltaSink;

pub use rate_limit::{client_key, spawn_sweeper, RateLimiter};

/// Stream `request` through the adapter registered for `ctx.provider`.
///
/// # Errors
///
/// Propagates adapter failures that happen before the upstream answered.
pub async fn stream(
    ctx: &UpstreamCtx<'_>,
    request: &NormalizedChatRequest,
    sink: &mut DeltaSink,
) -> Result<(), ProxyError> {
    match ctx.provider {
        Provider::OpenAi => OpenAiAdapter.stream(ctx, request, sink).await,
        Provider::Anthropic => AnthropicAdapter.stream(ctx, request, sink).await,
        Provider::Google => GoogleAdapter.stream(ctx, request, sink).await,
        Provider::Mistral => MistralAdapter.stream(ctx, request, sink).await,
        Provider::Cohere => CohereAdapter.stream(ctx, request, sink).await,
        Provider::BedrockMeta => BedrockMetaAdapter.stream(ctx, request, sink).await,
    }
}

/// Run a non-streaming completion through the adapter for `ctx.provider`.
///
/// # Errors
///
/// Returns the adapter's [`ProxyError`] (upstream status, transport or
/// decoding failure).
pub async fn complete(
    ctx: &UpstreamCtx<'_>,
    request: &NormalizedChatRequest,
) -> Result<String, ProxyError> {
    match ctx.provider {
        Provider::OpenAi => OpenAiAdapter.complete(ctx, request).await,
        Provider::Anthropic => AnthropicAdapter.complete(ctx, request).await,
        Provider::Google => GoogleAdapter.complete(ctx, request).await,
        Provider::Mistral => MistralAdapter.complete(ctx, request).await,
        Provider::Cohere => CohereAdapter.complete(ctx, request).await,
        Provider::BedrockMeta => BedrockMetaAdapter.complete(ctx, request).await,
    }
}
