//! Fetch capability traits and error types

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors a session can report for a single fetch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection reset, DNS failure, timeout inside the session
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("HTTP status {code}")]
    Status { code: u16 },

    /// The page is a bot challenge the session could not get past
    #[error("Bot challenge not solved: {0}")]
    Challenge(String),

    /// The session itself is broken (crashed, terminated, disconnected)
    #[error("Session fault: {0}")]
    Session(String),
}

impl FetchError {
    /// Returns true if retrying the same URL cannot succeed
    ///
    /// Client errors are permanent except 408 and 429, and except 401 and
    /// 403, which a bot-resistant site answers to a blocked session.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Status { code } => {
                (400..500).contains(code) && !matches!(*code, 401 | 403 | 408 | 429)
            }
            _ => false,
        }
    }

    /// Returns true if the session must be recreated before the next fetch
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self,
            Self::Challenge(_) | Self::Session(_) | Self::Status { code: 401 | 403 }
        )
    }
}

/// Options forwarded to every session a factory creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run without a visible UI
    pub headless: bool,

    /// User agent presented to the site
    pub user_agent: String,
}

/// A stateful page-retrieval session
///
/// Sessions are opaque to the crawler: they may render JavaScript, solve
/// challenges or simply issue HTTP requests. A fetch may block for an
/// arbitrary time; callers never rely on it honouring cancellation and use
/// [`Session::terminate`] instead.
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetches the content of `url`
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Cheap liveness probe used before reusing a session
    async fn is_healthy(&self) -> bool;

    /// Releases every resource held by the session
    ///
    /// Must be safe to call while a fetch is still running on another task,
    /// and more than once.
    async fn terminate(&self);
}

/// Creates sessions for worker slots
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Creates a fresh session for `slot`
    async fn create(
        &self,
        slot: usize,
        options: &SessionOptions,
    ) -> Result<Arc<dyn Session>, FetchError>;
}
