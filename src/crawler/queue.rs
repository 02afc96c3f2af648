//! Shared work queue for the worker pool
//!
//! Slots pull ready items, hold them while an attempt runs and hand them
//! back as completed (terminal) or requeued (retrying). The queue closes by
//! itself once nothing is waiting and nothing is in flight.

use crate::state::WorkItem;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<WorkItem>,
    in_flight: usize,
    closed: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.waiting.is_empty() && self.in_flight == 0
    }
}

/// Queue of work items shared by every slot of one stage
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                waiting: items.into(),
                in_flight: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the next item that may run now
    ///
    /// Waits while every waiting item is still backing off or while other
    /// slots hold items that may yet be requeued.
    ///
    /// # Returns
    ///
    /// * `Some(WorkItem)` - An item now counted as in flight
    /// * `None` - The queue is drained or closed
    pub async fn next(&self) -> Option<WorkItem> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }

                let now = Instant::now();
                if let Some(pos) = state.waiting.iter().position(|item| item.is_ready(now)) {
                    if let Some(item) = state.waiting.remove(pos) {
                        state.in_flight += 1;
                        return Some(item);
                    }
                }

                if state.is_drained() {
                    state.closed = true;
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }

                state
                    .waiting
                    .iter()
                    .filter_map(|item| item.not_before())
                    .min()
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Marks an in-flight item as finished for good
    pub fn complete(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_drained() {
            state.closed = true;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Returns an in-flight item for another attempt
    pub fn requeue(&self, item: WorkItem) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.waiting.push_back(item);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Stops handing out items; waiting items stay unprocessed
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Items still waiting for an attempt
    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
