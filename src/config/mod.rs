pub mod validation;

use serde::{Deserialize, Serialize};

use crate::protocol::Provider;

use self::validation::validate_config;

/// Env var naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "STREAMRELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Upstream read timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub trust_forwarded_headers: bool,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default = "default_true")]
    pub cors_allow_any_origin: bool,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_reuse_port_listener_count: Option<usize>,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_body_limit_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
            trust_forwarded_headers: false,
            http_use_env_proxy: false,
            cors_allow_any_origin: true,
            body_limit_bytes: default_body_limit_bytes(),
            tcp_reuse_port_listener_count: None,
        }
    }
}

/// Fixed-window rate limiting for proxy routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

fn default_window_ms() -> u64 {
    15_000
}
fn default_max_requests() -> u32 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
        }
    }
}

/// Per-provider upstream settings. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Inline secret; takes precedence over any environment variable.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Name of the env var holding the secret.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key for `provider` from the process environment.
    #[must_use]
    pub fn resolve_api_key(&self, provider: Provider) -> Option<String> {
        self.resolve_api_key_with(provider, |name| std::env::var(name).ok())
    }

    /// Inline key, then `api_key_env`, then the provider's conventional variable.
    pub fn resolve_api_key_with<F>(&self, provider: Provider, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
        self.api_key_env
            .as_deref()
            .into_iter()
            .chain(provider.api_key_env())
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

/// Upstream settings keyed the same way as the request path segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub google: ProviderConfig,
    #[serde(default)]
    pub mistral: ProviderConfig,
    #[serde(default)]
    pub cohere: ProviderConfig,
    #[serde(default, rename = "bedrock-meta")]
    pub bedrock_meta: ProviderConfig,
}

impl ProvidersConfig {
    #[must_use]
    pub fn get(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::Google => &self.google,
            Provider::Mistral => &self.mistral,
            Provider::Cohere => &self.cohere,
            Provider::BedrockMeta => &self.bedrock_meta,
        }
    }

    pub fn get_mut(&mut self, provider: Provider) -> &mut ProviderConfig {
        match provider {
            Provider::OpenAi => &mut self.openai,
            Provider::Anthropic => &mut self.anthropic,
            Provider::Google => &mut self.google,
            Provider::Mistral => &mut self.mistral,
            Provider::Cohere => &mut self.cohere,
            Provider::BedrockMeta => &mut self.bedrock_meta,
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file, apply env overrides and validate.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Config file path from `STREAMRELAY_CONFIG`, or `config.yaml`.
#[must_use]
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Parse YAML text. An empty document yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when the text is not a valid config document.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Apply deployment env overrides (`PORT`, `ENABLE_RATE_LIMIT`, `RL_WINDOW_MS`,
/// `RL_MAX`, `LOG_LEVEL`, `AWS_REGION`) on top of the file config.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when a numeric override does not parse.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(port) = var("PORT") {
        config.server.port = parse_override("PORT", &port)?;
    }
    if let Some(flag) = var("ENABLE_RATE_LIMIT") {
        config.rate_limit.enabled = flag.trim() == "1";
    }
    if let Some(window) = var("RL_WINDOW_MS") {
        config.rate_limit.window_ms = parse_override("RL_WINDOW_MS", &window)?;
    }
    if let Some(max) = var("RL_MAX") {
        config.rate_limit.max_requests = parse_override("RL_MAX", &max)?;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.features.log_level = level.trim().to_string();
    }
    if config.providers.bedrock_meta.region.is_none() {
        if let Some(region) = var("AWS_REGION") {
            config.providers.bedrock_meta.region = Some(region.trim().to_string());
        }
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{name} must be a number, got '{value}'")))
}
