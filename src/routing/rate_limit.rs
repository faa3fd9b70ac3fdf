use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Best-effort fixed-window request counter keyed by client address.
/// Single process, in memory only.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    windows: Mutex<FxHashMap<String, Window>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: Mutex::new(FxHashMap::default()),
        }
    }

    /// Build a limiter when rate limiting is enabled in `config`.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(Duration::from_millis(config.window_ms), config.max_requests))
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `key`; `false` means it must be rejected.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        match windows.get_mut(key) {
            Some(entry) if now < entry.reset_at => {
                entry.count = entry.count.saturating_add(1);
                entry.count <= self.max_requests
            }
            Some(entry) => {
                *entry = self.fresh_window(now);
                true
            }
            None => {
                windows.insert(key.to_owned(), self.fresh_window(now));
                true
            }
        }
    }

    fn fresh_window(&self, now: Instant) -> Window {
        Window {
            count: 1,
            reset_at: now + self.window,
        }
    }

    /// Drop every entry whose window has elapsed.
    pub fn sweep_at(&self, now: Instant) {
        self.windows.lock().retain(|_, entry| now < entry.reset_at);
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Sweep `limiter` once per window until it is dropped.
pub fn spawn_sweeper(limiter: &Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    let weak: Weak<RateLimiter> = Arc::downgrade(limiter);
    let period = limiter.window().max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };
            limiter.sweep_at(Instant::now());
        }
    })
}

/// Client key for rate limiting: the first `X-Forwarded-For` entry when
/// trusted, else the peer IP, else `"unknown"`.
#[must_use]
pub fn client_key(
    headers: &http::HeaderMap,
    peer: Option<std::net::SocketAddr>,
    trust_forwarded_headers: bool,
) -> String {
    if trust_forwarded_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(forwarded) = forwarded {
            return forwarded.to_owned();
        }
    }
    peer.map_or_else(|| "unknown".to_owned(), |addr| addr.ip().to_string())
}
