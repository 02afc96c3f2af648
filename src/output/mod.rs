//! Output module for stage reports and run summaries
//!
//! This module handles:
//! - Stage-level outcome counters and failed-item lists
//! - Printing run summaries to stdout
//! - Generating the markdown run report

mod markdown;
mod report;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use report::{print_summary, FailedItem, RunSummary, StageReport};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
