//! Configuration module
//!
//! Loads the TOML configuration, applies environment overrides and validates
//! the result. The loaded [`Config`] is immutable and shared by every stage.
//!
//! # Example
//!
//! ```no_run
//! use mise_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mise.toml")).unwrap();
//! println!("Crawling with {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, ListingConfig, OutputConfig, ResumeConfig, SiteConfig,
};

pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
    ENV_HEADLESS, ENV_WORKERS,
};
pub use validation::validate;
