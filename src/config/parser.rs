use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `crawler.workers`
pub const ENV_WORKERS: &str = "MISE_WORKERS";

/// Environment variable overriding `crawler.headless`
pub const ENV_HEADLESS: &str = "MISE_HEADLESS";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied before validation, so the returned
/// value is final apart from explicit CLI overrides.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use mise_crawler::config::load_config;
///
/// let config = load_config(Path::new("mise.toml")).unwrap();
/// println!("Workers: {}", config.crawler.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, std::env::vars())?;
    validate(&config)?;
    Ok(config)
}

/// Parses TOML content without environment overrides or validation
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Applies `MISE_WORKERS` / `MISE_HEADLESS` style overrides
///
/// Takes the variables explicitly so callers (and tests) control the source.
pub fn apply_env_overrides<I>(config: &mut Config, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, value) in vars {
        match name.as_str() {
            ENV_WORKERS => {
                config.crawler.workers =
                    value.trim().parse().map_err(|_| ConfigError::Env {
                        name: name.clone(),
                        value: value.clone(),
                    })?;
            }
            ENV_HEADLESS => {
                config.crawler.headless = parse_flag(&value).ok_or_else(|| ConfigError::Env {
                    name: name.clone(),
                    value: value.clone(),
                })?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at start so runs against different configs can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
