//! Per-slot fetching
//!
//! A [`SlotFetcher`] is the only way a stage handler reaches the network.
//! It pairs one [`WorkerSlot`] with the slot's [`SessionManager`], spaces
//! fetches out, supervises each one with the [`Watchdog`] and restarts the
//! session whenever a fetch hangs or the session reports a fault.

use crate::crawler::retry::{AttemptError, ItemError};
use crate::crawler::watchdog::{Watchdog, WatchdogOutcome};
use crate::session::{SessionError, SessionHandle, SessionManager};
use crate::state::{SlotBusy, SlotState, WorkItem, WorkerSlot};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Counters shared by every slot of one stage
#[derive(Debug, Default)]
pub struct FetchCounters {
    hang_timeouts: AtomicUsize,
    session_restarts: AtomicUsize,
}

impl FetchCounters {
    pub fn hang_timeouts(&self) -> usize {
        self.hang_timeouts.load(Ordering::Relaxed)
    }

    pub fn session_restarts(&self) -> usize {
        self.session_restarts.load(Ordering::Relaxed)
    }
}

/// Random spacing between two fetches of the same slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Politeness {
    pub min: Duration,
    pub max: Duration,
}

impl Politeness {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Fetch capability handed to stage handlers
pub struct SlotFetcher {
    slot: WorkerSlot,
    sessions: SessionManager,
    watchdog: Watchdog,
    politeness: Politeness,
    counters: Arc<FetchCounters>,
}

impl SlotFetcher {
    pub fn new(
        slot: WorkerSlot,
        sessions: SessionManager,
        watchdog: Watchdog,
        politeness: Politeness,
        counters: Arc<FetchCounters>,
    ) -> Self {
        Self {
            slot,
            sessions,
            watchdog,
            politeness,
            counters,
        }
    }

    pub fn slot(&self) -> &WorkerSlot {
        &self.slot
    }

    /// Opens the slot's first session before any item is taken
    pub async fn warm_up(&mut self) -> Result<(), SessionError> {
        let handle = self.sessions.acquire().await?;
        self.slot.set_generation(handle.generation());
        self.sessions.release(handle).await;
        Ok(())
    }

    pub fn bind(&mut self, item: &WorkItem) -> Result<(), SlotBusy> {
        self.slot.bind(item.id())
    }

    pub fn unbind(&mut self) {
        self.slot.unbind();
    }

    /// Fetches `url` with the slot's session under watchdog supervision
    ///
    /// # Errors
    ///
    /// * `ItemError::Attempt` - The attempt failed; the session has already
    ///   been restarted if the failure called for it
    /// * `ItemError::SessionLost` - No replacement session could be created
    pub async fn fetch(&mut self, url: &str) -> Result<String, ItemError> {
        self.wait_politely().await;

        let handle = self.sessions.acquire().await?;
        self.slot.set_generation(handle.generation());
        self.slot.record_fetch(Instant::now());
        debug!(slot = self.slot.id, generation = handle.generation(), url, "Fetching");

        match self.watchdog.supervise(handle.session(), url).await {
            WatchdogOutcome::Completed(Ok(_)) if !self.sessions.is_current(&handle) => {
                warn!(
                    slot = self.slot.id,
                    url,
                    generation = handle.generation(),
                    "Dropping result from a replaced session"
                );
                self.sessions.release(handle).await;
                self.slot.set_state(SlotState::Idle);
                Err(AttemptError::SessionFault("stale session generation".to_string()).into())
            }
            WatchdogOutcome::Completed(Ok(body)) => {
                self.sessions.release(handle).await;
                self.slot.set_state(SlotState::Idle);
                Ok(body)
            }
            WatchdogOutcome::Completed(Err(e)) if e.is_session_fault() => {
                warn!(slot = self.slot.id, url, error = %e, "Session fault during fetch");
                self.restart(handle).await?;
                Err(AttemptError::from(e).into())
            }
            WatchdogOutcome::Completed(Err(e)) => {
                self.sessions.release(handle).await;
                self.slot.set_state(SlotState::Idle);
                Err(e.into())
            }
            WatchdogOutcome::TimedOut => {
                self.slot.set_state(SlotState::Stuck);
                self.counters.hang_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    slot = self.slot.id,
                    url,
                    deadline_ms = self.watchdog.deadline().as_millis() as u64,
                    "Fetch hung past its deadline, aborting"
                );
                self.restart(handle).await?;
                Err(AttemptError::HangTimeout(self.watchdog.deadline()).into())
            }
            WatchdogOutcome::Crashed(message) => {
                warn!(slot = self.slot.id, url, error = %message, "Fetch task crashed");
                self.restart(handle).await?;
                Err(AttemptError::SessionFault(message).into())
            }
        }
    }

    /// Terminates the slot's session
    pub async fn shutdown(&mut self) {
        self.sessions.shutdown().await;
        self.slot.set_state(SlotState::Idle);
    }

    async fn restart(&mut self, handle: SessionHandle) -> Result<(), SessionError> {
        self.slot.set_state(SlotState::Restarting);
        self.counters.session_restarts.fetch_add(1, Ordering::Relaxed);

        let fresh = self.sessions.force_restart(handle).await?;
        debug!(
            slot = self.slot.id,
            generation = fresh.generation(),
            restarts = self.sessions.restarts(),
            "Session replaced"
        );
        self.slot.set_generation(fresh.generation());
        self.sessions.release(fresh).await;
        self.slot.set_state(SlotState::Idle);
        Ok(())
    }

    async fn wait_politely(&mut self) {
        let spacing = self.politeness.sample();
        if let Some(wait) = self.slot.time_until_next_fetch(spacing, Instant::now()) {
            tokio::time::sleep(wait).await;
        }
    }
}
