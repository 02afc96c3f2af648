use crate::checkpoint::ResumeCursor;
use crate::state::Stage;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
///
/// Built once at process start (file, then environment, then CLI overrides)
/// and shared read-only with every component afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Worker pool, watchdog and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent worker slots
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Whether sessions run without a visible UI
    #[serde(default)]
    pub headless: bool,

    /// Per-attempt fetch deadline enforced by the watchdog (milliseconds)
    #[serde(rename = "attempt-deadline-ms", default = "default_attempt_deadline_ms")]
    pub attempt_deadline_ms: u64,

    /// Attempts per work item before it is marked failed
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lower bound of the per-slot delay between fetches (milliseconds)
    #[serde(rename = "politeness-min-ms", default = "default_politeness_min_ms")]
    pub politeness_min_ms: u64,

    /// Upper bound of the per-slot delay between fetches (milliseconds)
    #[serde(rename = "politeness-max-ms", default = "default_politeness_max_ms")]
    pub politeness_max_ms: u64,

    /// First retry delay for transient failures (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on the exponential retry delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// How many times a slot tries to create a session before giving up
    #[serde(
        rename = "session-create-attempts",
        default = "default_session_create_attempts"
    )]
    pub session_create_attempts: u32,
}

impl CrawlerConfig {
    pub fn attempt_deadline(&self) -> Duration {
        Duration::from_millis(self.attempt_deadline_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            headless: false,
            attempt_deadline_ms: default_attempt_deadline_ms(),
            max_attempts: default_max_attempts(),
            politeness_min_ms: default_politeness_min_ms(),
            politeness_max_ms: default_politeness_max_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            session_create_attempts: default_session_create_attempts(),
        }
    }
}

/// Resume configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeConfig {
    /// Skip items whose artifact already exists
    #[serde(rename = "skip-existing", default = "default_true")]
    pub skip_existing: bool,

    /// Stage the explicit cursor applies to
    #[serde(default)]
    pub stage: Option<Stage>,

    /// Explicit cursor: a URL from the stage input or a 1-based position
    #[serde(default)]
    pub from: Option<ResumeCursor>,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            skip_existing: true,
            stage: None,
            from: None,
        }
    }
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site root; recipe links outside this host are dropped
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Category index pages fed to the discovery stage
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Newline-delimited list of URLs never to crawl
    #[serde(rename = "blacklist-path", default)]
    pub blacklist_path: Option<String>,
}

/// Pagination and link clean-up rules for the links stage
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Text a listing page shows once pagination is exhausted
    #[serde(rename = "end-marker", default = "default_end_marker")]
    pub end_marker: String,

    /// Safety limit on pages per category
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Stop a category after this many linkless pages in a row
    #[serde(
        rename = "max-consecutive-empty",
        default = "default_max_consecutive_empty"
    )]
    pub max_consecutive_empty: u32,

    /// Recipe URLs have at most this many path segments
    #[serde(rename = "max-path-segments", default = "default_max_path_segments")]
    pub max_path_segments: usize,

    /// Links containing any of these substrings are dropped
    #[serde(rename = "exclude-patterns", default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            end_marker: default_end_marker(),
            max_pages: default_max_pages(),
            max_consecutive_empty: default_max_consecutive_empty(),
            max_path_segments: default_max_path_segments(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory for stage inputs and artifacts
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    /// Path of the markdown run report (defaults to `<data-dir>/report.md`)
    #[serde(rename = "report-path", default)]
    pub report_path: Option<String>,

    /// User agent sent by HTTP sessions
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            report_path: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.data_dir)
    }

    pub fn blacklist_path(&self) -> PathBuf {
        match &self.site.blacklist_path {
            Some(path) => PathBuf::from(path),
            None => self.data_dir().join("blacklist.txt"),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        match &self.output.report_path {
            Some(path) => PathBuf::from(path),
            None => self.data_dir().join("report.md"),
        }
    }

    /// Returns the explicit cursor if it targets `stage`
    pub fn cursor_for(&self, stage: Stage) -> Option<&ResumeCursor> {
        match self.resume.stage {
            Some(s) if s == stage => self.resume.from.as_ref(),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_workers() -> u32 {
    3
}

fn default_attempt_deadline_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_politeness_min_ms() -> u64 {
    500
}

fn default_politeness_max_ms() -> u64 {
    1_500
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_session_create_attempts() -> u32 {
    3
}

fn default_end_marker() -> String {
    "Nothing Found".to_string()
}

fn default_max_pages() -> u32 {
    2_000
}

fn default_max_consecutive_empty() -> u32 {
    3
}

fn default_max_path_segments() -> usize {
    1
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["weekly-meal-".to_string(), "-recipes".to_string()]
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
