use crate::config::types::{Config, CrawlerConfig, OutputConfig, SitemapConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Largest page budget a single crawl may request
pub const MAX_PAGES_LIMIT: u32 = 10_000;

/// Largest inter-request delay a crawl may request (milliseconds)
pub const MAX_DELAY_MS: u64 = 60_000;

/// Smallest per-request timeout accepted (milliseconds)
pub const MIN_TIMEOUT_MS: u64 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_sitemap_config(&config.sitemap)?;
    Ok(())
}

/// Checks a page budget and delay against the accepted ranges
///
/// Shared by config validation and by crawl requests that override the
/// configured defaults.
pub fn validate_crawl_limits(max_pages: u32, delay_ms: u64) -> Result<(), ConfigError> {
    if max_pages < 1 || max_pages > MAX_PAGES_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and {}, got {}",
            MAX_PAGES_LIMIT, max_pages
        )));
    }

    if delay_ms > MAX_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "delay_ms must be <= {}ms, got {}ms",
            MAX_DELAY_MS, delay_ms
        )));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_crawl_limits(config.max_pages, config.delay_ms)?;

    if config.timeout_ms < MIN_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= {}ms, got {}ms",
            MIN_TIMEOUT_MS, config.timeout_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, ASCII alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the sitemap limits (kept small for interactive use)
fn validate_sitemap_config(config: &SitemapConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 || config.max_pages > 200 {
        return Err(ConfigError::Validation(format!(
            "sitemap max_pages must be between 1 and 200, got {}",
            config.max_pages
        )));
    }

    if config.max_depth < 1 || config.max_depth > 10 {
        return Err(ConfigError::Validation(format!(
            "sitemap max_depth must be between 1 and 10, got {}",
            config.max_depth
        )));
    }

    if config.delay_ms > MAX_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "sitemap delay_ms must be <= {}ms, got {}ms",
            MAX_DELAY_MS, config.delay_ms
        )));
    }

    Ok(())
}
