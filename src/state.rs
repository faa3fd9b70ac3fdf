mod request_id;

use std::sync::Arc;

use crate::adapters::UpstreamCtx;
use crate::config::AppConfig;
use crate::protocol::Provider;
use crate::routing::RateLimiter;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers. Read-only after
/// startup apart from the rate limiter's own counters.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    rate_limiter: Option<Arc<RateLimiter>>,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let rate_limiter = RateLimiter::from_config(&config.rate_limit).map(Arc::new);
        Self {
            config,
            transport,
            rate_limiter,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build state with a transport derived from `config`.
    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        let transport = HttpTransport::new(&config);
        Self::new(config, transport)
    }

    #[must_use]
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_id()
    }

    /// Per-call adapter context for `provider`.
    #[must_use]
    pub fn upstream_ctx(&self, provider: Provider) -> UpstreamCtx<'_> {
        UpstreamCtx {
            provider,
            settings: self.config.providers.get(provider),
            transport: &self.transport,
        }
    }
}
