//! Mise: a resumable, multi-stage recipe crawler
//!
//! This crate drives a three-stage crawl (category discovery, recipe link
//! discovery, recipe detail extraction) through a pool of session-bound
//! workers, supervising every fetch with a watchdog and checkpointing
//! progress as one artifact per work item.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod session;
pub mod state;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a stage or the whole run
///
/// Item-level failures never surface here; they are contained by the worker
/// pool and reported through [`output::StageReport`].
#[derive(Debug, Error)]
pub enum MiseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read input list {path}: {source}")]
    InputUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Input list for stage {stage} is empty")]
    EmptyInput { stage: state::Stage },

    #[error("No session could be established for stage {stage}: {message}")]
    SessionUnavailable {
        stage: state::Stage,
        message: String,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {name}={value}")]
    Env { name: String, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, MiseError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Pipeline;
pub use output::StageReport;
pub use state::{ItemStatus, Stage, WorkItem};
