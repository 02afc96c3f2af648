//! HTTP session built on reqwest
//!
//! The default fetch capability: one `reqwest::Client` per session, so a
//! forced restart drops every pooled connection of the old session.

use crate::session::{FetchError, Session, SessionFactory, SessionOptions};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Page texts served while a bot challenge is pending
const CHALLENGE_MARKERS: &[&str] = &[
    "Just a moment...",
    "Checking if the site connection is secure",
];

/// Builds the HTTP client backing one session
///
/// # Arguments
///
/// * `options` - Session options; only the user agent applies to HTTP
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(options: &SessionOptions) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(options.user_agent.clone())
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// A session fetching pages with plain HTTP requests
pub struct HttpSession {
    client: Client,
    terminated: AtomicBool,
}

impl HttpSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            terminated: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Session for HttpSession {
    /// Fetches a page and classifies the outcome
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | 2xx with challenge text | `Challenge` |
    /// | 2xx | page body |
    /// | 403/503 with challenge text | `Challenge` |
    /// | other status | `Status` (401/403 count as session faults) |
    /// | connect / timeout / body error | `Network` |
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(FetchError::Session("session terminated".to_string()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        if status.is_success() {
            if let Some(marker) = challenge_marker(&body) {
                return Err(FetchError::Challenge(marker.to_string()));
            }
            return Ok(body);
        }

        if status == StatusCode::FORBIDDEN || status == StatusCode::SERVICE_UNAVAILABLE {
            if let Some(marker) = challenge_marker(&body) {
                return Err(FetchError::Challenge(marker.to_string()));
            }
        }

        Err(FetchError::Status {
            code: status.as_u16(),
        })
    }

    async fn is_healthy(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst)
    }

    async fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

fn challenge_marker(body: &str) -> Option<&'static str> {
    CHALLENGE_MARKERS
        .iter()
        .copied()
        .find(|marker| body.contains(marker))
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network("Request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Network(format!("Connection failed: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Creates one [`HttpSession`] per slot
///
/// `SessionOptions::headless` has no effect on plain HTTP sessions.
#[derive(Debug, Default, Clone)]
pub struct HttpSessionFactory;

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn create(
        &self,
        slot: usize,
        options: &SessionOptions,
    ) -> Result<Arc<dyn Session>, FetchError> {
        let client = build_http_client(options)
            .map_err(|e| FetchError::Session(format!("Failed to build HTTP client: {}", e)))?;
        tracing::debug!(slot, headless = options.headless, "Created HTTP session");
        Ok(Arc::new(HttpSession::new(client)))
    }
}
