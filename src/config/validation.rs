use super::{AppConfig, ConfigError};
use crate::protocol::Provider;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_rate_limit(config)?;
    validate_providers(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.body_limit_bytes == 0 {
        return Err(validation_err(
            "server.body_limit_bytes must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    for (name, value) in [
        ("runtime_worker_threads", server.runtime_worker_threads),
        ("tcp_reuse_port_listener_count", server.tcp_reuse_port_listener_count),
    ] {
        if value == Some(0) {
            return Err(validation_err(format!(
                "server.{name} must be greater than 0 when set"
            )));
        }
    }
    let base_path = server.base_path.trim();
    if !base_path.is_empty() && !base_path.starts_with('/') {
        return Err(validation_err("server.base_path must start with '/'"));
    }
    Ok(())
}

fn validate_rate_limit(config: &AppConfig) -> Result<(), ConfigError> {
    let rate_limit = &config.rate_limit;
    if !rate_limit.enabled {
        return Ok(());
    }
    if rate_limit.window_ms == 0 {
        return Err(validation_err("rate_limit.window_ms must be greater than 0"));
    }
    if rate_limit.max_requests == 0 {
        return Err(validation_err(
            "rate_limit.max_requests must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_providers(config: &AppConfig) -> Result<(), ConfigError> {
    for provider in Provider::ALL {
        let settings = config.providers.get(provider);
        validate_http_url(provider, "base_url", settings.base_url.as_deref())?;
        validate_http_url(provider, "proxy", settings.proxy.as_deref())?;
        if let Some(env_name) = settings.api_key_env.as_deref() {
            if env_name.trim().is_empty() {
                return Err(validation_err(format!(
                    "Provider '{provider}': api_key_env cannot be empty when set"
                )));
            }
        }
    }
    Ok(())
}

fn validate_http_url(
    provider: Provider,
    field_name: &str,
    value: Option<&str>,
) -> Result<(), ConfigError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(());
    };
    if value.is_empty() {
        return Err(validation_err(format!(
            "Provider '{provider}': {field_name} cannot be empty when set"
        )));
    }
    let parsed = url::Url::parse(value).map_err(|err| {
        validation_err(format!(
            "Provider '{provider}': {field_name} is not a valid URL: {err}"
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "Provider '{provider}': {field_name} must use http:// or https://"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
