//! Crawler module: stage execution on a pool of supervised workers
//!
//! This module contains the core crawling logic, including:
//! - The shared work queue and retry policy
//! - Watchdog supervision of every fetch
//! - Worker slots bound to one session each
//! - Stage handlers and the stage pipeline

mod handlers;
mod orchestrator;
mod pool;
mod queue;
mod retry;
mod watchdog;
mod worker;

pub use handlers::{DetailHandler, DiscoveryHandler, ListingHandler};
pub use orchestrator::{input_list_name, Pipeline, StagePlan};
pub use pool::{ItemHandler, WorkerPool};
pub use queue::WorkQueue;
pub use retry::{AttemptError, ItemError, RetryDecision, RetryPolicy};
pub use watchdog::{Watchdog, WatchdogOutcome};
pub use worker::{FetchCounters, Politeness, SlotFetcher};
