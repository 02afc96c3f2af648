//! Worker pool
//!
//! Runs the work items of one stage on a fixed number of slots. Every slot
//! owns its session, pulls items from the shared [`WorkQueue`], hands them to
//! the stage's [`ItemHandler`] and settles the outcome: persist on success,
//! requeue or fail according to the [`RetryPolicy`] otherwise. Item failures
//! never escape the pool; only the loss of every session or a panicking slot
//! aborts the stage.

use crate::checkpoint::{CheckpointStore, CrawlResult, Rejection};
use crate::config::CrawlerConfig;
use crate::crawler::queue::WorkQueue;
use crate::crawler::retry::{AttemptError, ItemError, RetryDecision, RetryPolicy};
use crate::crawler::watchdog::Watchdog;
use crate::crawler::worker::{FetchCounters, Politeness, SlotFetcher};
use crate::output::{FailedItem, StageReport};
use crate::session::{SessionFactory, SessionManager, SessionOptions};
use crate::state::{Stage, WorkItem, WorkerSlot};
use crate::MiseError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Stage-specific processing of one work item
///
/// Handlers fetch through the slot's [`SlotFetcher`] and return the payload
/// to persist. They never write the item's artifact themselves.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    async fn handle(&self, item: &WorkItem, fetcher: &mut SlotFetcher) -> Result<Value, ItemError>;
}

/// Why a slot task ended
#[derive(Debug)]
enum SlotExit {
    Drained,
    SessionLost(String),
}

#[derive(Debug, Default)]
struct ItemCounters {
    done: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    failed_items: Mutex<Vec<FailedItem>>,
}

/// State shared by the slot tasks of one stage
struct StageRun {
    stage: Stage,
    queue: WorkQueue,
    store: CheckpointStore,
    policy: RetryPolicy,
    handler: Arc<dyn ItemHandler>,
    items: ItemCounters,
    live_slots: AtomicUsize,
}

/// Fixed-size pool of session-bound worker slots
pub struct WorkerPool {
    crawler: CrawlerConfig,
    options: SessionOptions,
    factory: Arc<dyn SessionFactory>,
    store: CheckpointStore,
    policy: RetryPolicy,
}

impl WorkerPool {
    pub fn new(
        crawler: CrawlerConfig,
        options: SessionOptions,
        factory: Arc<dyn SessionFactory>,
        store: CheckpointStore,
    ) -> Self {
        let policy = RetryPolicy::from_config(&crawler);
        Self {
            crawler,
            options,
            factory,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Processes `items` until each one is Done or Failed
    ///
    /// Outcome counters are added to `report`.
    ///
    /// # Errors
    ///
    /// * `MiseError::SessionUnavailable` - Every slot lost its session while
    ///   items were still outstanding
    /// * `MiseError::Worker` - A slot task panicked
    pub async fn process(
        &self,
        items: Vec<WorkItem>,
        handler: Arc<dyn ItemHandler>,
        report: &mut StageReport,
    ) -> Result<(), MiseError> {
        let stage = report.stage;
        if items.is_empty() {
            info!(stage = %stage, "Nothing to process");
            return Ok(());
        }

        let workers = (self.crawler.workers as usize).clamp(1, items.len());
        info!(stage = %stage, items = items.len(), workers, "Starting worker pool");

        let run = Arc::new(StageRun {
            stage,
            queue: WorkQueue::new(items),
            store: self.store.clone(),
            policy: self.policy.clone(),
            handler,
            items: ItemCounters::default(),
            live_slots: AtomicUsize::new(workers),
        });
        let counters = Arc::new(FetchCounters::default());

        let mut slots = JoinSet::new();
        for id in 0..workers {
            let fetcher = self.slot_fetcher(id, Arc::clone(&counters));
            let run = Arc::clone(&run);
            slots.spawn(run_slot(run, fetcher).instrument(info_span!("slot", id)));
        }

        let mut last_session_error = None;
        while let Some(joined) = slots.join_next().await {
            match joined {
                Ok(SlotExit::Drained) => {}
                Ok(SlotExit::SessionLost(message)) => last_session_error = Some(message),
                Err(e) => {
                    error!(stage = %stage, error = %e, "Worker slot panicked, aborting stage");
                    run.queue.close();
                    slots.abort_all();
                    return Err(MiseError::Worker(e));
                }
            }
        }

        report.done += run.items.done.load(Ordering::Relaxed);
        report.failed += run.items.failed.load(Ordering::Relaxed);
        report.retried += run.items.retried.load(Ordering::Relaxed);
        report.hang_timeouts += counters.hang_timeouts();
        report.session_restarts += counters.session_restarts();
        let mut failed_items = std::mem::take(
            &mut *run
                .items
                .failed_items
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        failed_items.sort_by(|a, b| a.url.cmp(&b.url));
        report.failed_items.extend(failed_items);

        let outstanding = run.queue.waiting() + run.queue.in_flight();
        if outstanding > 0 {
            return Err(MiseError::SessionUnavailable {
                stage,
                message: format!(
                    "{} items left unprocessed: {}",
                    outstanding,
                    last_session_error.unwrap_or_else(|| "all slots stopped".to_string())
                ),
            });
        }
        Ok(())
    }

    fn slot_fetcher(&self, id: usize, counters: Arc<FetchCounters>) -> SlotFetcher {
        let sessions = SessionManager::new(
            id,
            Arc::clone(&self.factory),
            self.options.clone(),
            self.crawler.session_create_attempts,
            self.crawler.backoff_base(),
        );
        SlotFetcher::new(
            WorkerSlot::new(id),
            sessions,
            Watchdog::new(self.crawler.attempt_deadline()),
            Politeness::new(
                Duration::from_millis(self.crawler.politeness_min_ms),
                Duration::from_millis(self.crawler.politeness_max_ms),
            ),
            counters,
        )
    }
}

async fn run_slot(run: Arc<StageRun>, mut fetcher: SlotFetcher) -> SlotExit {
    let exit = match fetcher.warm_up().await {
        Ok(()) => work(&run, &mut fetcher).await,
        Err(e) => {
            error!(error = %e, "Slot could not open a session");
            SlotExit::SessionLost(e.to_string())
        }
    };
    fetcher.shutdown().await;

    if run.live_slots.fetch_sub(1, Ordering::AcqRel) == 1 {
        // Last slot out: nobody is left to take the remaining items.
        run.queue.close();
    }
    exit
}

async fn work(run: &StageRun, fetcher: &mut SlotFetcher) -> SlotExit {
    while let Some(mut item) = run.queue.next().await {
        let attempt = match item.begin_attempt() {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(url = item.url(), error = %e, "Dequeued item is not runnable");
                run.queue.complete();
                continue;
            }
        };

        let outcome = match fetcher.bind(&item) {
            Ok(()) => match run.handler.handle(&item, fetcher).await {
                Ok(payload) => run.persist(&item, attempt, payload),
                Err(e) => Err(e),
            },
            Err(busy) => Err(AttemptError::SessionFault(busy.to_string()).into()),
        };
        fetcher.unbind();

        match outcome {
            Ok(()) => run.finish(item, attempt),
            Err(ItemError::Attempt(e)) => run.settle(item, &e, attempt),
            Err(ItemError::SessionLost(e)) => {
                error!(error = %e, "Slot lost its session, stopping");
                run.settle(item, &AttemptError::SessionFault(e.to_string()), attempt);
                return SlotExit::SessionLost(e.to_string());
            }
        }
    }
    SlotExit::Drained
}

impl StageRun {
    fn persist(&self, item: &WorkItem, attempt: u32, payload: Value) -> Result<(), ItemError> {
        let result = CrawlResult {
            url: item.url().to_string(),
            stage: self.stage,
            identifier: item.id().to_string(),
            fetched_at: Utc::now(),
            attempts: attempt,
            payload,
        };
        self.store
            .persist(self.stage, item.id(), &result)
            .map_err(|e| AttemptError::Persist(e.to_string()))?;
        Ok(())
    }

    fn finish(&self, mut item: WorkItem, attempt: u32) {
        if let Err(e) = item.mark_done() {
            warn!(url = item.url(), error = %e, "Unexpected state on completion");
        }
        self.items.done.fetch_add(1, Ordering::Relaxed);
        info!(url = item.url(), id = item.id(), attempt, "Done");
        self.queue.complete();
    }

    fn settle(&self, mut item: WorkItem, error: &AttemptError, attempt: u32) {
        match self.policy.decide(error, attempt) {
            RetryDecision::Retry(delay) => {
                let not_before = (!delay.is_zero()).then(|| Instant::now() + delay);
                if let Err(e) = item.mark_retrying(error.to_string(), not_before) {
                    warn!(url = item.url(), error = %e, "Unexpected state on retry");
                }
                self.items.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    url = item.url(),
                    attempt,
                    kind = error.kind(),
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, will retry: {}",
                    error
                );
                self.queue.requeue(item);
            }
            RetryDecision::Fail => {
                if let Err(e) = item.mark_failed(error.to_string()) {
                    warn!(url = item.url(), error = %e, "Unexpected state on failure");
                }
                self.items.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    url = item.url(),
                    attempts = item.attempts(),
                    kind = error.kind(),
                    "Item failed: {}",
                    error
                );

                if error.is_permanent() {
                    let rejection = Rejection {
                        url: item.url().to_string(),
                        stage: self.stage,
                        identifier: item.id().to_string(),
                        rejected_at: Utc::now(),
                        error: error.to_string(),
                    };
                    if let Err(e) = self.store.reject(self.stage, item.id(), &rejection) {
                        warn!(url = item.url(), error = %e, "Failed to write rejection marker");
                    }
                }

                self.items
                    .failed_items
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(FailedItem {
                        url: item.url().to_string(),
                        identifier: item.id().to_string(),
                        attempts: item.attempts(),
                        error: error.to_string(),
                        permanent: error.is_permanent(),
                    });
                self.queue.complete();
            }
        }
    }
}
