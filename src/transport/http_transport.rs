use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::protocol::Provider;

const PROXY_CLIENT_CACHE_MAX_ENTRIES: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client settings shared by the base client and every per-proxy client.
#[derive(Debug, Clone, Copy)]
struct ClientSettings {
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    read_timeout: Duration,
    use_env_proxy: bool,
}

fn build_reqwest_client(
    settings: ClientSettings,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, ProxyError> {
    // Streams may run for minutes: bound idle reads, not the whole exchange.
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(settings.pool_max_idle_per_host)
        .pool_idle_timeout(settings.pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .read_timeout(settings.read_timeout);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| ProxyError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !settings.use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ProxyError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Pooled outbound HTTP client. One base client plus one client per
/// configured upstream proxy URL.
pub struct HttpTransport {
    base_client: OnceLock<Arc<reqwest::Client>>,
    preconfigured_proxy_clients: FxHashMap<String, Arc<reqwest::Client>>,
    dynamic_proxy_clients: RwLock<FxHashMap<String, Arc<reqwest::Client>>>,
    settings: ClientSettings,
}

impl HttpTransport {
    /// Build a transport from server settings, prebuilding a client for every
    /// provider `proxy` in the config.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let server = &config.server;
        let settings = ClientSettings {
            pool_max_idle_per_host: server.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout: (server.http_pool_idle_timeout_secs > 0)
                .then(|| Duration::from_secs(server.http_pool_idle_timeout_secs)),
            read_timeout: Duration::from_secs(server.timeout.max(1)),
            use_env_proxy: server.http_use_env_proxy,
        };

        let mut preconfigured_proxy_clients = FxHashMap::default();
        let proxy_urls = Provider::ALL
            .iter()
            .filter_map(|provider| config.providers.get(*provider).proxy.as_deref());
        for proxy_url in proxy_urls {
            let proxy_url = proxy_url.trim();
            if proxy_url.is_empty() || preconfigured_proxy_clients.contains_key(proxy_url) {
                continue;
            }
            match build_reqwest_client(settings, Some(proxy_url)) {
                Ok(client) => {
                    preconfigured_proxy_clients.insert(proxy_url.to_owned(), Arc::new(client));
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        "failed to prebuild proxy HTTP client, falling back to lazy build"
                    );
                }
            }
        }

        Self {
            base_client: OnceLock::new(),
            preconfigured_proxy_clients,
            dynamic_proxy_clients: RwLock::new(FxHashMap::default()),
            settings,
        }
    }

    fn base_reqwest_client(&self) -> Arc<reqwest::Client> {
        if let Some(existing) = self.base_client.get() {
            return existing.clone();
        }

        let built = match build_reqwest_client(self.settings, None) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                Arc::new(reqwest::Client::new())
            }
        };
        let _ = self.base_client.set(built.clone());
        self.base_client.get().cloned().unwrap_or(built)
    }

    fn client_for_proxy(&self, proxy_url: Option<&str>) -> Result<Arc<reqwest::Client>, ProxyError> {
        let Some(proxy_url) = proxy_url.map(str::trim).filter(|url| !url.is_empty()) else {
            return Ok(self.base_reqwest_client());
        };

        if let Some(existing) = self.preconfigured_proxy_clients.get(proxy_url) {
            return Ok(existing.clone());
        }
        if let Some(existing) = self.dynamic_proxy_clients.read().get(proxy_url) {
            return Ok(existing.clone());
        }

        let client = Arc::new(build_reqwest_client(self.settings, Some(proxy_url))?);

        let mut cache = self.dynamic_proxy_clients.write();
        if let Some(existing) = cache.get(proxy_url) {
            return Ok(existing.clone());
        }
        if cache.len() >= PROXY_CLIENT_CACHE_MAX_ENTRIES {
            cache.clear();
        }
        cache.insert(proxy_url.to_string(), client.clone());
        Ok(client)
    }

    /// POST `body` to `url`. Exactly one attempt; the caller inspects the status.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the client cannot be built or
    /// the request fails before response headers arrive.
    pub async fn post(
        &self,
        url: url::Url,
        headers: http::HeaderMap,
        body: bytes::Bytes,
        proxy_url: Option<&str>,
    ) -> Result<reqwest::Response, ProxyError> {
        let client = self.client_for_proxy(proxy_url)?;
        let mut request = reqwest::Request::new(http::Method::POST, url);
        *request.headers_mut() = headers;
        *request.body_mut() = Some(reqwest::Body::from(body));

        client.execute(request).await.map_err(|err| {
            // reqwest embeds the URL (and any `key=` query) in its Display output.
            ProxyError::Transport(err.without_url().to_string())
        })
    }
}
