//! Attempt failure classification and retry policy

use crate::config::CrawlerConfig;
use crate::extract::ExtractError;
use crate::session::{FetchError, SessionError};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// Why a single attempt at a work item failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Fetch did not finish within {0:?}")]
    HangTimeout(Duration),

    #[error("Session fault: {0}")]
    SessionFault(String),

    #[error("Permanent failure: {0}")]
    PermanentExtraction(String),

    #[error("Failed to persist artifact: {0}")]
    Persist(String),
}

impl AttemptError {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "transient_network",
            Self::HangTimeout(_) => "hang_timeout",
            Self::SessionFault(_) => "session_fault",
            Self::PermanentExtraction(_) => "permanent_extraction",
            Self::Persist(_) => "persist",
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::PermanentExtraction(_))
    }
}

impl From<FetchError> for AttemptError {
    fn from(e: FetchError) -> Self {
        if e.is_permanent() {
            Self::PermanentExtraction(e.to_string())
        } else if e.is_session_fault() {
            Self::SessionFault(e.to_string())
        } else {
            Self::TransientNetwork(e.to_string())
        }
    }
}

impl From<ExtractError> for AttemptError {
    fn from(e: ExtractError) -> Self {
        Self::PermanentExtraction(e.to_string())
    }
}

/// Failure of one attempt as seen by the worker pool
///
/// Besides ordinary attempt failures, a slot can lose its session for good,
/// which ends the slot after the item is settled.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Attempt(#[from] AttemptError),

    #[error(transparent)]
    SessionLost(#[from] SessionError),
}

impl From<FetchError> for ItemError {
    fn from(e: FetchError) -> Self {
        Self::Attempt(e.into())
    }
}

impl From<ExtractError> for ItemError {
    fn from(e: ExtractError) -> Self {
        Self::Attempt(e.into())
    }
}

/// What to do with an item after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue; the item may run again after the delay
    Retry(Duration),
    /// Mark the item Failed
    Fail,
}

/// Bounded retry with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base(), config.backoff_max())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides the fate of an item whose `attempt`-th attempt failed
    ///
    /// | Error | Decision |
    /// |-------|----------|
    /// | PermanentExtraction | Fail immediately |
    /// | any, attempt == max | Fail |
    /// | HangTimeout, SessionFault | Retry now (session already restarted) |
    /// | TransientNetwork, Persist | Retry after backoff |
    pub fn decide(&self, error: &AttemptError, attempt: u32) -> RetryDecision {
        if error.is_permanent() || attempt >= self.max_attempts {
            return RetryDecision::Fail;
        }
        match error {
            AttemptError::HangTimeout(_) | AttemptError::SessionFault(_) => {
                RetryDecision::Retry(Duration::ZERO)
            }
            _ => RetryDecision::Retry(self.backoff(attempt)),
        }
    }

    /// Backoff before retrying after the `attempt`-th failure
    ///
    /// `base * 2^(attempt-1)` capped at the configured maximum, plus a
    /// uniform jitter of up to half that delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.capped_delay(attempt);
        let jitter_ms = (delay.as_millis() / 2) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}
