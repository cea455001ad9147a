use crate::config::types::{
    ClientConfig, Config, FrontierBackend, FrontierConfig, ProxyConfig, SiteConfig, StoreConfig,
};
use crate::crawler::MatchRule;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_client_config(&config.client)?;
    validate_frontier_config(&config.frontier)?;
    validate_proxy_config(&config.proxy)?;
    validate_store_config(&config.store)?;
    // Selectors come from the config file, so compile them up front
    MatchRule::compile(&config.rule)?;
    Ok(())
}

/// Validates the target site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.root).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid site root '{}': {}", config.root, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Site root '{}' must use HTTP or HTTPS",
            config.root
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Site root '{}' has no host",
            config.root
        )));
    }

    if config.detail_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "detail-prefix cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates client and concurrency configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.connections < 1 || config.connections > 256 {
        return Err(ConfigError::Validation(format!(
            "connections must be between 1 and 256, got {}",
            config.connections
        )));
    }

    if config.poll_interval_ms < 50 {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms must be >= 50ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.task_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "task-timeout-secs must be greater than zero".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates frontier configuration
fn validate_frontier_config(config: &FrontierConfig) -> Result<(), ConfigError> {
    if config.key_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "key-prefix cannot be empty".to_string(),
        ));
    }

    if config.backend == FrontierBackend::Redis {
        match config.redis_url.as_deref() {
            None | Some("") => {
                return Err(ConfigError::Validation(
                    "redis-url is required for the redis frontier backend".to_string(),
                ));
            }
            Some(redis_url) => {
                Url::parse(redis_url).map_err(|e| {
                    ConfigError::InvalidUrl(format!("Invalid redis-url '{}': {}", redis_url, e))
                })?;
            }
        }

        if config.ping_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "ping-interval-secs must be greater than zero".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates proxy configuration
///
/// Empty provider credentials are left to the pool's initialisation, which
/// reports them as a provider error.
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if !config.enable {
        return Ok(());
    }

    if config.size < 1 {
        return Err(ConfigError::Validation(format!(
            "proxy size must be >= 1, got {}",
            config.size
        )));
    }

    let jg = config.jg.as_ref().ok_or_else(|| {
        ConfigError::Validation("proxy is enabled but [proxy.jg] is missing".to_string())
    })?;

    for (name, base) in [("api-base", &jg.api_base), ("ip-base", &jg.ip_base)] {
        Url::parse(base)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, base, e)))?;
    }

    if !(-12..=14).contains(&jg.utc_offset_hours) {
        return Err(ConfigError::Validation(format!(
            "utc-offset-hours must be between -12 and 14, got {}",
            jg.utc_offset_hours
        )));
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
