//! Work item state definitions
//!
//! A [`WorkItem`] is one URL to process at one [`Stage`]. It lives only for
//! the duration of a run; the durable record of completion is the artifact
//! named after [`WorkItem::id`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Instant;

/// Longest slug kept in front of the hash part of an identifier
const MAX_SLUG_LEN: usize = 60;

/// Hex characters of the URL hash kept in an identifier
const HASH_LEN: usize = 12;

/// One of the three sequential crawl phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Category discovery from the seed pages
    Discovery,
    /// Recipe link discovery across paginated category listings
    Links,
    /// Recipe detail extraction
    Details,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Discovery, Stage::Links, Stage::Details];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Links => "links",
            Self::Details => "details",
        }
    }

    /// Directory (under the data dir) holding this stage's artifacts
    pub fn artifact_dir(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Links => "links",
            Self::Details => "recipes",
        }
    }

    /// The stage consuming this stage's output, if any
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Discovery => Some(Self::Links),
            Self::Links => Some(Self::Details),
            Self::Details => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discovery" | "categories" => Ok(Self::Discovery),
            "links" => Ok(Self::Links),
            "details" | "recipes" => Ok(Self::Details),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Lifecycle status of a work item within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Loaded from the stage input, not yet attempted
    Pending,
    /// Bound to a worker slot
    InProgress,
    /// Artifact persisted
    Done,
    /// Last attempt failed, another attempt is allowed
    Retrying,
    /// Attempts exhausted or permanent failure
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if a worker may pick the item up
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }

    pub fn can_transition_to(&self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::InProgress)
                | (Self::Retrying, Self::InProgress)
                | (Self::InProgress, Self::Done)
                | (Self::InProgress, Self::Retrying)
                | (Self::InProgress, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ItemStatus,
    pub to: ItemStatus,
}

/// One unit of crawl work
#[derive(Debug, Clone)]
pub struct WorkItem {
    url: String,
    stage: Stage,
    id: String,
    ordinal: usize,
    status: ItemStatus,
    attempts: u32,
    last_error: Option<String>,
    not_before: Option<Instant>,
}

impl WorkItem {
    /// Creates a pending item; `ordinal` is its 1-based position in the input
    pub fn new(url: impl Into<String>, stage: Stage, ordinal: usize) -> Self {
        let url = url.into();
        let id = item_identifier(stage, &url);
        Self {
            url,
            stage,
            id,
            ordinal,
            status: ItemStatus::Pending,
            attempts: 0,
            last_error: None,
            not_before: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn not_before(&self) -> Option<Instant> {
        self.not_before
    }

    /// Returns true if the item can be dequeued at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        self.status.is_runnable() && self.not_before.map_or(true, |t| t <= now)
    }

    /// Starts a new attempt, returning its 1-based number
    pub fn begin_attempt(&mut self) -> Result<u32, InvalidTransition> {
        self.transition(ItemStatus::InProgress)?;
        self.attempts += 1;
        self.not_before = None;
        Ok(self.attempts)
    }

    pub fn mark_done(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Done)?;
        self.last_error = None;
        Ok(())
    }

    /// Schedules another attempt no earlier than `not_before`
    pub fn mark_retrying(
        &mut self,
        error: impl Into<String>,
        not_before: Option<Instant>,
    ) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Retrying)?;
        self.last_error = Some(error.into());
        self.not_before = not_before;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Failed)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, to: ItemStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Derives the stable artifact identifier for a URL at a stage
///
/// The identifier is a readable slug of host and path followed by a short
/// SHA-256 digest of `stage` and `url`, so it is a valid file stem and maps
/// the same URL to the same artifact on every run.
///
/// ```
/// use mise_crawler::state::{item_identifier, Stage};
///
/// let id = item_identifier(Stage::Details, "https://example.com/lemon-bars/");
/// assert!(id.starts_with("example-com-lemon-bars-"));
/// assert_eq!(id, item_identifier(Stage::Details, "https://example.com/lemon-bars/"));
/// ```
pub fn item_identifier(stage: Stage, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let slug = slugify(url);
    if slug.is_empty() {
        format!("item-{}", &digest[..HASH_LEN])
    } else {
        format!("{}-{}", slug, &digest[..HASH_LEN])
    }
}

fn slugify(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);

    let mut slug = String::with_capacity(without_scheme.len());
    for c in without_scheme.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}
