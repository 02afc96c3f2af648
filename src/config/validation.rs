use crate::checkpoint::ResumeCursor;
use crate::config::types::{Config, CrawlerConfig, ListingConfig, OutputConfig, ResumeConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on worker slots; each slot owns a full session
const MAX_WORKERS: u32 = 32;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_resume_config(&config.resume)?;
    validate_site_config(&config.site)?;
    validate_listing_config(&config.listing)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.attempt_deadline_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "attempt-deadline-ms must be >= 100ms, got {}ms",
            config.attempt_deadline_ms
        )));
    }

    if config.politeness_min_ms > config.politeness_max_ms {
        return Err(ConfigError::Validation(format!(
            "politeness-min-ms ({}) exceeds politeness-max-ms ({})",
            config.politeness_min_ms, config.politeness_max_ms
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-base-ms ({}) exceeds backoff-max-ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.session_create_attempts < 1 {
        return Err(ConfigError::Validation(
            "session-create-attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_resume_config(config: &ResumeConfig) -> Result<(), ConfigError> {
    match (&config.from, config.stage) {
        (Some(_), None) => Err(ConfigError::Validation(
            "resume.from requires resume.stage".to_string(),
        )),
        (Some(ResumeCursor::Ordinal(0)), _) => Err(ConfigError::Validation(
            "resume.from ordinal positions start at 1".to_string(),
        )),
        (Some(ResumeCursor::Url(url)), _) => {
            validate_http_url(url, "resume.from")?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = validate_http_url(&config.base_url, "site.base-url")?;
    if base.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "site.base-url '{}' has no host",
            config.base_url
        )));
    }

    for seed in &config.seeds {
        validate_http_url(seed, "seed")?;
    }

    if let Some(path) = &config.blacklist_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "site.blacklist-path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    if config.end_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "listing.end-marker cannot be empty".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "listing.max-pages must be >= 1".to_string(),
        ));
    }

    if config.max_consecutive_empty < 1 {
        return Err(ConfigError::Validation(
            "listing.max-consecutive-empty must be >= 1".to_string(),
        ));
    }

    if config.max_path_segments < 1 {
        return Err(ConfigError::Validation(
            "listing.max-path-segments must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output.data-dir cannot be empty".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(value: &str, what: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(url)
}
