//! Deadline supervision for in-flight fetches
//!
//! The fetch runs in its own task so a session that never returns cannot
//! stall the slot: once the deadline passes the task is aborted and its
//! output is never observed. Recovering the session is the caller's job.

use crate::session::{FetchError, Session};
use std::sync::Arc;
use std::time::Duration;

/// Result of one supervised fetch
#[derive(Debug, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The fetch returned before the deadline
    Completed(Result<String, FetchError>),
    /// The deadline elapsed; the fetch task was aborted
    TimedOut,
    /// The fetch task panicked
    Crashed(String),
}

/// Per-attempt deadline supervisor
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    deadline: Duration,
}

impl Watchdog {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs `session.fetch(url)` under the deadline
    ///
    /// # Arguments
    ///
    /// * `session` - The session to fetch with
    /// * `url` - The URL to fetch
    pub async fn supervise(&self, session: Arc<dyn Session>, url: &str) -> WatchdogOutcome {
        let url = url.to_string();
        let mut task = tokio::spawn(async move { session.fetch(&url).await });

        match tokio::time::timeout(self.deadline, &mut task).await {
            Ok(Ok(result)) => WatchdogOutcome::Completed(result),
            Ok(Err(join_error)) => WatchdogOutcome::Crashed(join_error.to_string()),
            Err(_) => {
                task.abort();
                WatchdogOutcome::TimedOut
            }
        }
    }
}
