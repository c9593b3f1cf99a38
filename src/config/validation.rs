use crate::config::types::{
    Config, CrawlerConfig, DomainsConfig, QueueConfig, RateLimitConfig, RobotsConfig,
    StorageConfig,
};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_domains_config(&config.domains)?;
    validate_robots_config(&config.robots)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_queue_config(&config.queue)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates fetch loop configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.retries < 1 {
        return Err(ConfigError::Validation(
            "retries must be >= 1".to_string(),
        ));
    }

    ensure_ordered_window("min_delay", config.min_delay, "max_delay", config.max_delay)?;
    ensure_ordered_window(
        "cooldown_min",
        config.cooldown_min,
        "cooldown_max",
        config.cooldown_max,
    )?;

    if !(config.retry_backoff_base > 0.0) {
        return Err(ConfigError::Validation(format!(
            "retry_backoff_base must be > 0, got {}",
            config.retry_backoff_base
        )));
    }

    if config.retry_backoff_max < config.retry_backoff_base {
        return Err(ConfigError::Validation(format!(
            "retry_backoff_max ({}) must be >= retry_backoff_base ({})",
            config.retry_backoff_max, config.retry_backoff_base
        )));
    }

    if config.page_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "page_timeout_ms must be >= 100ms, got {}ms",
            config.page_timeout_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that `low <= high` and both are finite and non-negative
fn ensure_ordered_window(
    low_name: &str,
    low: f64,
    high_name: &str,
    high: f64,
) -> Result<(), ConfigError> {
    if !low.is_finite() || !high.is_finite() || low < 0.0 || high < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} and {} must be finite and non-negative",
            low_name, high_name
        )));
    }
    if low > high {
        return Err(ConfigError::Validation(format!(
            "{} ({}) must be <= {} ({})",
            low_name, low, high_name, high
        )));
    }
    Ok(())
}

/// Validates allow/deny domain lists
fn validate_domains_config(config: &DomainsConfig) -> Result<(), ConfigError> {
    for pattern in config.allow.iter().chain(config.deny.iter()) {
        validate_domain_pattern(pattern)?;
    }
    Ok(())
}

/// Validates robots.txt configuration
fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "robots user_agent cannot be empty".to_string(),
        ));
    }

    if !config
        .user_agent
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "robots user_agent must contain only alphanumeric characters, '-' and '_', got '{}'",
            config.user_agent
        )));
    }

    Ok(())
}

/// Validates adaptive pacing configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if !(config.domain_delay_base > 0.0) {
        return Err(ConfigError::Validation(format!(
            "domain_delay_base must be > 0, got {}",
            config.domain_delay_base
        )));
    }

    if config.domain_delay_max < config.domain_delay_base {
        return Err(ConfigError::Validation(format!(
            "domain_delay_max ({}) must be >= domain_delay_base ({})",
            config.domain_delay_max, config.domain_delay_base
        )));
    }

    if !(config.increase_factor >= 1.0) {
        return Err(ConfigError::Validation(format!(
            "increase_factor must be >= 1.0, got {}",
            config.increase_factor
        )));
    }

    if !(config.decrease_factor > 0.0 && config.decrease_factor <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "decrease_factor must be in (0, 1], got {}",
            config.decrease_factor
        )));
    }

    Ok(())
}

/// Validates queue configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.running_stale_seconds < 1 {
        return Err(ConfigError::Validation(
            "running_stale_seconds must be >= 1".to_string(),
        ));
    }

    if config.claim_oversample < 1 {
        return Err(ConfigError::Validation(
            "claim_oversample must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.content_dir.is_empty() {
        return Err(ConfigError::Validation(
            "content_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_domain_string(domain)
}

/// Validates a domain string (without wildcard prefix)
///
/// A `:port` suffix is accepted so that hosts on non-default ports can be listed.
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    let host = match domain.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => domain,
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
