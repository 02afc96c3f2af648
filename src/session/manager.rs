//! Per-slot session lifecycle
//!
//! Each worker slot owns exactly one [`SessionManager`]. The manager hands
//! out the current session as a [`SessionHandle`], takes it back after the
//! fetch and tears it down when the watchdog or a session fault says so.

use crate::session::{Session, SessionFactory, SessionOptions};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on how long a terminate call may take before it is abandoned
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Slot {slot} could not create a session after {attempts} attempts: {message}")]
    Creation {
        slot: usize,
        attempts: u32,
        message: String,
    },
}

/// Borrowed use of one session generation
///
/// Results are only trusted if the handle's generation is still the
/// manager's current generation.
#[derive(Clone)]
pub struct SessionHandle {
    generation: u64,
    session: Arc<dyn Session>,
}

impl SessionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> Arc<dyn Session> {
        Arc::clone(&self.session)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Owns the session of one worker slot
pub struct SessionManager {
    slot: usize,
    factory: Arc<dyn SessionFactory>,
    options: SessionOptions,
    create_attempts: u32,
    backoff_base: Duration,
    current: Option<SessionHandle>,
    generation: u64,
    restarts: u32,
}

impl SessionManager {
    /// Creates a manager; no session is opened until the first acquire
    ///
    /// # Arguments
    ///
    /// * `slot` - Owning slot id, forwarded to the factory
    /// * `factory` - Session factory shared by all slots
    /// * `options` - Options passed to every created session
    /// * `create_attempts` - Bounded creation retries
    /// * `backoff_base` - Delay before the second creation attempt, doubled afterwards
    pub fn new(
        slot: usize,
        factory: Arc<dyn SessionFactory>,
        options: SessionOptions,
        create_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            slot,
            factory,
            options,
            create_attempts: create_attempts.max(1),
            backoff_base,
            current: None,
            generation: 0,
            restarts: 0,
        }
    }

    /// Current session generation; 0 before the first session exists
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of forced restarts performed so far
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Returns true if the handle belongs to the current generation
    pub fn is_current(&self, handle: &SessionHandle) -> bool {
        handle.generation == self.generation
    }

    /// Returns a healthy session, creating one if needed
    pub async fn acquire(&mut self) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.current.take() {
            if handle.session.is_healthy().await {
                return Ok(handle);
            }
            warn!(
                slot = self.slot,
                generation = handle.generation,
                "Session failed health check, recreating"
            );
            terminate(&handle).await;
        }
        self.create().await
    }

    /// Returns a handle after use
    ///
    /// A handle from an older generation is terminated instead of kept.
    pub async fn release(&mut self, handle: SessionHandle) {
        if !self.is_current(&handle) {
            debug!(
                slot = self.slot,
                stale = handle.generation,
                current = self.generation,
                "Dropping stale session handle"
            );
            terminate(&handle).await;
            return;
        }
        self.current = Some(handle);
    }

    /// Terminates the session behind `handle` and creates a fresh one
    ///
    /// Termination is unconditional; the old session is never reused even
    /// if its fetch is still running.
    pub async fn force_restart(
        &mut self,
        handle: SessionHandle,
    ) -> Result<SessionHandle, SessionError> {
        self.restarts += 1;
        info!(
            slot = self.slot,
            generation = handle.generation,
            "Force-restarting session"
        );
        terminate(&handle).await;
        if let Some(current) = self.current.take() {
            if current.generation != handle.generation {
                terminate(&current).await;
            }
        }
        self.create().await
    }

    /// Terminates the current session, if any
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.current.take() {
            terminate(&handle).await;
        }
    }

    async fn create(&mut self) -> Result<SessionHandle, SessionError> {
        let mut last_error = String::new();

        for attempt in 1..=self.create_attempts {
            match self.factory.create(self.slot, &self.options).await {
                Ok(session) => {
                    self.generation += 1;
                    debug!(
                        slot = self.slot,
                        generation = self.generation,
                        "Session created"
                    );
                    return Ok(SessionHandle {
                        generation: self.generation,
                        session,
                    });
                }
                Err(e) => {
                    warn!(
                        slot = self.slot,
                        attempt,
                        max = self.create_attempts,
                        error = %e,
                        "Session creation failed"
                    );
                    last_error = e.to_string();
                    if attempt < self.create_attempts {
                        let delay = self.backoff_base.saturating_mul(1 << (attempt - 1).min(16));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(SessionError::Creation {
            slot: self.slot,
            attempts: self.create_attempts,
            message: last_error,
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { terminate(&handle).await });
            }
        }
    }
}

async fn terminate(handle: &SessionHandle) {
    if tokio::time::timeout(TERMINATE_TIMEOUT, handle.session.terminate())
        .await
        .is_err()
    {
        warn!(
            generation = handle.generation,
            "Session did not terminate in time, abandoning it"
        );
    }
}
