//! Stage and run reports

use crate::state::Stage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// A work item that ended Failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub url: String,
    pub identifier: String,
    pub attempts: u32,
    pub error: String,
    /// Failed without retry (extraction or permanent HTTP status)
    pub permanent: bool,
}

/// Outcome counters of one stage run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,

    /// URLs in the stage input list
    pub input_total: usize,

    /// Items skipped because their artifact already existed
    pub skipped_existing: usize,

    /// Items skipped because of an earlier permanent failure marker
    pub skipped_rejected: usize,

    /// Items before the explicit resume cursor
    pub skipped_cursor: usize,

    /// Items that ended Done in this run
    pub done: usize,

    /// Items that ended Failed in this run
    pub failed: usize,

    /// Retry scheduling events (one item may retry more than once)
    pub retried: usize,

    /// Fetches aborted by the watchdog
    pub hang_timeouts: usize,

    /// Forced session restarts across all slots
    pub session_restarts: usize,

    pub failed_items: Vec<FailedItem>,

    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            input_total: 0,
            skipped_existing: 0,
            skipped_rejected: 0,
            skipped_cursor: 0,
            done: 0,
            failed: 0,
            retried: 0,
            hang_timeouts: 0,
            session_restarts: 0,
            failed_items: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Items handed to the worker pool
    pub fn scheduled(&self) -> usize {
        self.input_total
            .saturating_sub(self.skipped_existing + self.skipped_rejected + self.skipped_cursor)
    }

    /// Percentage of scheduled items that ended Done
    pub fn success_rate(&self) -> f64 {
        let scheduled = self.scheduled();
        if scheduled == 0 {
            100.0
        } else {
            (self.done as f64 / scheduled as f64) * 100.0
        }
    }

    /// Logs the stage summary, one warning per failed item
    pub fn log_summary(&self) {
        tracing::info!(
            stage = %self.stage,
            done = self.done,
            failed = self.failed,
            retried = self.retried,
            hang_timeouts = self.hang_timeouts,
            session_restarts = self.session_restarts,
            skipped_existing = self.skipped_existing,
            skipped_cursor = self.skipped_cursor,
            "Stage finished in {:.1}s",
            self.elapsed.as_secs_f64()
        );
        for item in &self.failed_items {
            tracing::warn!(
                stage = %self.stage,
                url = %item.url,
                attempts = item.attempts,
                "Failed: {}",
                item.error
            );
        }
    }
}

/// Reports of every stage attempted in one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: Option<String>,
    pub stages: Vec<StageReport>,
    /// Fatal error that stopped the run, if any
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            config_hash: None,
            stages: Vec::new(),
            aborted: None,
        }
    }

    pub fn total_done(&self) -> usize {
        self.stages.iter().map(|s| s.done).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}

/// Prints stage reports to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("=== Crawl Summary ===\n");

    for report in &summary.stages {
        println!("Stage {}:", report.stage);
        println!("  Input: {}", report.input_total);
        println!(
            "  Skipped: {} existing, {} rejected, {} before cursor",
            report.skipped_existing, report.skipped_rejected, report.skipped_cursor
        );
        println!(
            "  Done: {}  Failed: {}  Retries: {}",
            report.done, report.failed, report.retried
        );
        println!(
            "  Hang timeouts: {}  Session restarts: {}",
            report.hang_timeouts, report.session_restarts
        );
        println!(
            "  Success rate: {:.1}% in {:.1}s",
            report.success_rate(),
            report.elapsed.as_secs_f64()
        );
        println!();
    }

    if let Some(reason) = &summary.aborted {
        println!("Run aborted: {}", reason);
    }
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
