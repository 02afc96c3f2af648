use crate::checkpoint::{CheckpointError, CheckpointResult};
use crate::state::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Extension of completed artifacts
const ARTIFACT_EXT: &str = "json";

/// Extension of permanent-failure markers
const REJECTED_EXT: &str = "rejected";

/// Prefix `tempfile` gives in-progress writes
const TEMP_PREFIX: &str = ".tmp";

/// Artifact written for every successfully processed work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub stage: Stage,
    pub identifier: String,
    pub fetched_at: DateTime<Utc>,
    pub attempts: u32,
    pub payload: serde_json::Value,
}

/// Marker left for an item that failed permanently
///
/// Markers keep skip-existing runs from refetching pages that are known to
/// be unusable. Deleting the marker (or disabling skip-existing) makes the
/// item eligible again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub url: String,
    pub stage: Stage,
    pub identifier: String,
    pub rejected_at: DateTime<Utc>,
    pub error: String,
}

/// File-backed checkpoint store rooted at the data directory
///
/// Layout:
///
/// ```text
/// <root>/<stage-dir>/<identifier>.json          completed artifact
/// <root>/<stage-dir>/<identifier>.rejected      permanent failure marker
/// <root>/<stage-dir>/<identifier>/page-<n>.json saved listing page
/// ```
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.artifact_dir())
    }

    pub fn artifact_path(&self, stage: Stage, identifier: &str) -> PathBuf {
        self.stage_dir(stage)
            .join(format!("{}.{}", identifier, ARTIFACT_EXT))
    }

    fn rejection_path(&self, stage: Stage, identifier: &str) -> PathBuf {
        self.stage_dir(stage)
            .join(format!("{}.{}", identifier, REJECTED_EXT))
    }

    fn page_path(&self, stage: Stage, identifier: &str, page: u32) -> PathBuf {
        self.stage_dir(stage)
            .join(identifier)
            .join(format!("page-{}.{}", page, ARTIFACT_EXT))
    }

    /// Scans the stage directory for completed artifacts
    ///
    /// Only `*.json` files count. Leftover temporary files from an
    /// interrupted write are removed; they were never renamed into place and
    /// so never marked anything done.
    ///
    /// # Returns
    ///
    /// The identifiers of every completed item. A missing directory yields
    /// an empty set.
    pub fn already_done(&self, stage: Stage) -> CheckpointResult<HashSet<String>> {
        let done = self.scan(stage, ARTIFACT_EXT)?;
        tracing::debug!(stage = %stage, count = done.len(), "Scanned done-set");
        Ok(done)
    }

    /// Scans the stage directory for permanent-failure markers
    pub fn rejected(&self, stage: Stage) -> CheckpointResult<HashSet<String>> {
        self.scan(stage, REJECTED_EXT)
    }

    fn scan(&self, stage: Stage, ext: &str) -> CheckpointResult<HashSet<String>> {
        let dir = self.stage_dir(stage);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut found = HashSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.starts_with(TEMP_PREFIX) {
                tracing::warn!(path = %path.display(), "Removing stale temporary file");
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
                }
                continue;
            }
            if name.starts_with('.') || !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                found.insert(stem.to_string());
            }
        }
        Ok(found)
    }

    /// Atomically writes the artifact for a completed item
    ///
    /// The artifact is written to a temporary file in the stage directory
    /// and renamed into place, so a crash leaves either the full artifact or
    /// none at all.
    pub fn persist(
        &self,
        stage: Stage,
        identifier: &str,
        result: &CrawlResult,
    ) -> CheckpointResult<PathBuf> {
        let path = self.artifact_path(stage, identifier);
        write_json_atomic(&path, result)?;
        Ok(path)
    }

    /// Loads a completed artifact, if present
    pub fn load(&self, stage: Stage, identifier: &str) -> CheckpointResult<Option<CrawlResult>> {
        read_json(&self.artifact_path(stage, identifier))
    }

    /// Records a permanent failure for an item
    pub fn reject(&self, stage: Stage, identifier: &str, rejection: &Rejection) -> CheckpointResult<()> {
        write_json_atomic(&self.rejection_path(stage, identifier), rejection)
    }

    /// Saves one listing page of a paginated item
    pub fn persist_page(
        &self,
        stage: Stage,
        identifier: &str,
        page: u32,
        payload: &serde_json::Value,
    ) -> CheckpointResult<()> {
        write_json_atomic(&self.page_path(stage, identifier, page), payload)
    }

    /// Loads a saved listing page, if present
    pub fn load_page(
        &self,
        stage: Stage,
        identifier: &str,
        page: u32,
    ) -> CheckpointResult<Option<serde_json::Value>> {
        read_json(&self.page_path(stage, identifier, page))
    }

    /// Atomically writes a newline-delimited list under the data directory
    pub fn write_list(&self, name: &str, lines: &[String]) -> CheckpointResult<PathBuf> {
        let path = self.root.join(name);
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CheckpointResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| CheckpointError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> CheckpointResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(bytes).map_err(|e| io_error(path, e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> CheckpointResult<Option<T>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };
    let value = serde_json::from_slice(&content).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}
