use crate::config::types::{ApiConfig, Config, CrawlerConfig, ExportConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_export_config(&config.export)?;
    validate_seeds(&config.frontier.seeds)?;
    Ok(())
}

/// Validates remote API settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl tuning
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.session_budget_secs == 0 {
        return Err(ConfigError::Validation(
            "session-budget-secs must be >= 1".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.quota_window_secs == 0 {
        return Err(ConfigError::Validation(
            "quota-window-secs must be >= 1".to_string(),
        ));
    }

    // A claim that expires mid-fetch would let a second worker take the entity over.
    if config.claim_lease_secs <= config.session_budget_secs {
        return Err(ConfigError::Validation(format!(
            "claim-lease-secs ({}) must exceed session-budget-secs ({})",
            config.claim_lease_secs, config.session_budget_secs
        )));
    }

    for (name, size) in [
        ("content-page-size", config.content_page_size),
        ("ids-page-size", config.ids_page_size),
        ("profiles-page-size", config.profiles_page_size),
    ] {
        if size == 0 {
            return Err(ConfigError::Validation(format!("{} must be >= 1", name)));
        }
    }

    if config.max_content_pages == 0 {
        return Err(ConfigError::Validation(
            "max-content-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_export_config(config: &ExportConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "export directory cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Entity ids are stored as signed 64-bit integers
fn validate_seeds(seeds: &[u64]) -> Result<(), ConfigError> {
    if let Some(bad) = seeds.iter().find(|id| **id > i64::MAX as u64) {
        return Err(ConfigError::Validation(format!(
            "seed id {} is out of range",
            bad
        )));
    }
    Ok(())
}
