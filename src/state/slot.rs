//! Worker slot state
//!
//! A [`WorkerSlot`] tracks what one worker is doing, which session
//! generation it runs on and when it last fetched.

use std::fmt;
use thiserror::Error;
use tokio::time::{Duration, Instant};

/// Execution state of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Waiting for work or between fetches
    Idle,
    /// A fetch is in flight under watchdog supervision
    Fetching,
    /// The watchdog deadline elapsed for the in-flight fetch
    Stuck,
    /// The slot's session is being torn down and recreated
    Restarting,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Stuck => "stuck",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Slot {slot} already holds item {held}")]
pub struct SlotBusy {
    pub slot: usize,
    pub held: String,
}

/// Tracks one concurrent execution context
///
/// A slot holds at most one work item at a time and owns the session
/// generation it is currently fetching with. Every state change refreshes
/// the heartbeat.
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    /// Slot index, stable for the lifetime of the pool
    pub id: usize,

    /// Current execution state
    state: SlotState,

    /// Generation of the session the slot currently fetches with
    generation: u64,

    /// Instant of the last state change
    last_heartbeat: Instant,

    /// Identifier of the bound work item
    current: Option<String>,

    /// When the last fetch on this slot started
    last_fetch: Option<Instant>,
}

impl WorkerSlot {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: SlotState::Idle,
            generation: 0,
            last_heartbeat: Instant::now(),
            current: None,
            last_fetch: None,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Binds a work item to the slot
    ///
    /// # Errors
    ///
    /// Returns [`SlotBusy`] if another item is still bound.
    pub fn bind(&mut self, item_id: &str) -> Result<(), SlotBusy> {
        if let Some(held) = &self.current {
            return Err(SlotBusy {
                slot: self.id,
                held: held.clone(),
            });
        }
        self.current = Some(item_id.to_string());
        self.touch();
        Ok(())
    }

    pub fn unbind(&mut self) {
        self.current = None;
        self.set_state(SlotState::Idle);
    }

    pub fn set_state(&mut self, state: SlotState) {
        self.state = state;
        self.touch();
    }

    /// Records the session generation the slot now fetches with
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.touch();
    }

    /// Marks the start of a fetch
    pub fn record_fetch(&mut self, now: Instant) {
        self.last_fetch = Some(now);
        self.set_state(SlotState::Fetching);
    }

    /// Time still to wait before the next fetch honours `spacing`
    ///
    /// # Returns
    ///
    /// * `None` - A fetch may start now
    /// * `Some(duration)` - Remaining wait
    pub fn time_until_next_fetch(&self, spacing: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_fetch?;
        let elapsed = now.duration_since(last);
        if elapsed >= spacing {
            None
        } else {
            Some(spacing - elapsed)
        }
    }

    fn touch(&mut self) {
        self.last_heartbeat = Instant::now();
    }
}
