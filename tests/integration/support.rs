//! Scripted sessions and helpers shared by the integration tests

use async_trait::async_trait;
use mise_crawler::config::{parse_config, Config};
use mise_crawler::extract::{ExtractError, RecordExtractor};
use mise_crawler::session::{FetchError, Session, SessionFactory, SessionOptions};
use mise_crawler::Pipeline;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::time::Instant;
use url::Url;

/// What one fetch of a URL does
#[derive(Debug, Clone)]
pub enum Step {
    Page(String),
    Hang,
    Fail(FetchError),
}

/// In-memory site shared by every scripted session
///
/// Each URL plays its scripted steps in order, then serves its default
/// page. Unknown URLs serve a recipe named after the URL.
#[derive(Default)]
pub struct FakeSite {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    defaults: Mutex<HashMap<String, String>>,
    fetches: Mutex<HashMap<String, usize>>,
    served: Mutex<HashMap<String, Instant>>,
    total: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, url: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.defaults
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn fetches_of(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// When `url` last answered with a page
    pub fn served_at(&self, url: &str) -> Option<Instant> {
        self.served.lock().unwrap().get(url).copied()
    }

    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Step {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        if let Some(step) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return step;
        }
        let body = self
            .defaults
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| recipe_page(url));
        Step::Page(body)
    }
}

struct FakeSession {
    site: Arc<FakeSite>,
}

#[async_trait]
impl Session for FakeSession {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match self.site.next_step(url) {
            Step::Page(body) => {
                self.site
                    .served
                    .lock()
                    .unwrap()
                    .insert(url.to_string(), Instant::now());
                Ok(body)
            }
            Step::Hang => std::future::pending().await,
            Step::Fail(e) => Err(e),
        }
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn terminate(&self) {}
}

/// Factory handing out sessions on a [`FakeSite`]
pub struct FakeFactory {
    site: Arc<FakeSite>,
    broken: bool,
    pub created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(site: Arc<FakeSite>) -> Arc<Self> {
        Arc::new(Self {
            site,
            broken: false,
            created: AtomicUsize::new(0),
        })
    }

    /// A factory whose every creation attempt fails
    pub fn broken(site: Arc<FakeSite>) -> Arc<Self> {
        Arc::new(Self {
            site,
            broken: true,
            created: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(
        &self,
        _slot: usize,
        _options: &SessionOptions,
    ) -> Result<Arc<dyn Session>, FetchError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(FetchError::Session("browser failed to start".to_string()));
        }
        Ok(Arc::new(FakeSession {
            site: Arc::clone(&self.site),
        }))
    }
}

/// Extractor for pages of the form `recipe:<title>`
pub struct PrefixExtractor;

impl RecordExtractor for PrefixExtractor {
    fn extract(&self, url: &Url, html: &str) -> Result<Value, ExtractError> {
        let title = html
            .strip_prefix("recipe:")
            .filter(|t| !t.is_empty())
            .ok_or(ExtractError::MissingField("title"))?;
        Ok(json!({ "url": url.as_str(), "title": title }))
    }
}

pub fn recipe_page(url: &str) -> String {
    format!("recipe:{}", url.trim_end_matches('/').rsplit('/').next().unwrap_or(url))
}

/// `count` recipe URLs whose sorted order matches their numbering
pub fn recipe_urls(count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| format!("https://example.com/recipe-{:02}/", n))
        .collect()
}

/// Test configuration: no politeness delay, no backoff, short deadline
pub fn test_config(dir: &TempDir, extra: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
workers = 3
attempt-deadline-ms = 2000
max-attempts = 3
politeness-min-ms = 0
politeness-max-ms = 0
backoff-base-ms = 0
backoff-max-ms = 0
session-create-attempts = 2

[site]
base-url = "https://example.com/"

[output]
data-dir = "{}"
{}
"#,
        dir.path().display(),
        extra
    );
    parse_config(&toml).unwrap()
}

pub fn pipeline(config: Config, factory: Arc<FakeFactory>) -> Pipeline {
    Pipeline::with_collaborators(config, factory, Arc::new(PrefixExtractor))
}
