//! Checkpoint and resume support
//!
//! Progress is never logged separately: a work item is done exactly when its
//! artifact exists on disk. This module scans those artifacts into a
//! done-set, writes new ones atomically and applies explicit resume cursors.

mod cursor;
mod store;

pub use cursor::{apply_cursor, ResumeCursor};
pub use store::{CheckpointStore, CrawlResult, Rejection};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing checkpoint artifacts
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize artifact {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Corrupt artifact {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;
