//! Stage pipeline orchestration
//!
//! The [`Pipeline`] runs discovery, links and details strictly in that
//! order. Each stage reads its input list, drops what the checkpoint store
//! already holds, hands the rest to a [`WorkerPool`] and, for the first two
//! stages, merges its artifacts into the next stage's input list.

use crate::checkpoint::{apply_cursor, CheckpointStore, ResumeCursor};
use crate::config::Config;
use crate::crawler::handlers::{DetailHandler, DiscoveryHandler, ListingHandler};
use crate::crawler::pool::{ItemHandler, WorkerPool};
use crate::extract::{RecipeExtractor, RecordExtractor};
use crate::output::{write_markdown_report, RunSummary, StageReport};
use crate::session::{HttpSessionFactory, SessionFactory, SessionOptions};
use crate::state::{item_identifier, Stage, WorkItem};
use crate::url::{load_blacklist, load_url_list, normalize_url, parse_url_list, ListFilter};
use crate::{ConfigError, MiseError};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Input list file of a stage, under the data directory
pub fn input_list_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Discovery => "seeds.txt",
        Stage::Links => "categories.txt",
        Stage::Details => "recipes.txt",
    }
}

/// What a stage would do, as shown by `--dry-run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,
    /// Input size, or `None` if the list does not exist yet
    pub input_total: Option<usize>,
    pub already_done: usize,
    pub rejected: usize,
    pub cursor: Option<ResumeCursor>,
}

/// Sequences the crawl stages over one immutable configuration
pub struct Pipeline {
    config: Arc<Config>,
    factory: Arc<dyn SessionFactory>,
    extractor: Arc<dyn RecordExtractor>,
    store: CheckpointStore,
    config_hash: Option<String>,
}

impl Pipeline {
    /// Creates a pipeline with the default HTTP sessions and recipe extractor
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(HttpSessionFactory),
            Arc::new(RecipeExtractor),
        )
    }

    pub fn with_collaborators(
        config: Config,
        factory: Arc<dyn SessionFactory>,
        extractor: Arc<dyn RecordExtractor>,
    ) -> Self {
        let store = CheckpointStore::new(config.data_dir());
        Self {
            config: Arc::new(config),
            factory,
            extractor,
            store,
            config_hash: None,
        }
    }

    /// Records the config hash in the run report
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Loads the input list of `stage`
    ///
    /// Discovery reads `site.seeds` when configured and `seeds.txt`
    /// otherwise; later stages read the list the previous stage wrote.
    ///
    /// # Errors
    ///
    /// * `MiseError::InputUnreadable` - The list file is missing or unreadable
    pub fn load_input(&self, stage: Stage) -> Result<Vec<String>, MiseError> {
        if stage == Stage::Discovery && !self.config.site.seeds.is_empty() {
            return Ok(parse_url_list(&self.config.site.seeds.join("\n")));
        }
        let path = self.config.data_dir().join(input_list_name(stage));
        load_url_list(&path).map_err(|source| MiseError::InputUnreadable { path, source })
    }

    /// Runs the selected stages in pipeline order
    ///
    /// Stops at the first stage that fails fatally. The markdown run report
    /// is written either way.
    pub async fn run(&self, stages: &[Stage]) -> Result<RunSummary, MiseError> {
        let mut summary = RunSummary::new(Utc::now());
        summary.config_hash = self.config_hash.clone();

        let mut outcome = Ok(());
        for stage in Stage::ALL.into_iter().filter(|s| stages.contains(s)) {
            let result = match self.load_input(stage) {
                Ok(input) => self.run_stage(stage, input).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(report) => summary.stages.push(report),
                Err(e) => {
                    error!(stage = %stage, error = %e, "Stage aborted, stopping pipeline");
                    summary.aborted = Some(format!("stage {}: {}", stage, e));
                    outcome = Err(e);
                    break;
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        let report_path = self.config.report_path();
        match write_markdown_report(&summary, &report_path) {
            Ok(()) => info!(path = %report_path.display(), "Run report written"),
            Err(e) => warn!(path = %report_path.display(), error = %e, "Failed to write run report"),
        }

        outcome.map(|()| summary)
    }

    /// Runs one stage over `input`
    ///
    /// # Errors
    ///
    /// * `MiseError::EmptyInput` - `input` has no URLs
    /// * `MiseError::SessionUnavailable` - No slot could keep a session
    /// * `MiseError::Checkpoint` - The artifact directory cannot be scanned
    pub async fn run_stage(&self, stage: Stage, input: Vec<String>) -> Result<StageReport, MiseError> {
        let started = Instant::now();
        let input = dedup(input);
        if input.is_empty() {
            return Err(MiseError::EmptyInput { stage });
        }

        let mut report = StageReport::new(stage);
        report.input_total = input.len();
        info!(stage = %stage, input = input.len(), "Starting stage");

        let output_filter = self.output_filter(stage)?;
        let handler = self.handler(stage, output_filter.clone());
        let items = self.select_items(stage, &input, &mut report)?;

        let pool = WorkerPool::new(
            self.config.crawler.clone(),
            self.session_options(),
            Arc::clone(&self.factory),
            self.store.clone(),
        );
        pool.process(items, handler, &mut report).await?;

        let failed: Vec<String> = report.failed_items.iter().map(|f| f.url.clone()).collect();
        let path = self
            .store
            .write_list(&format!("failed-{}.txt", stage), &failed)?;
        if !failed.is_empty() {
            warn!(stage = %stage, count = failed.len(), path = %path.display(), "Failed URLs written");
        }

        if let Some(filter) = output_filter {
            self.merge_output(stage, &input, &filter)?;
        }

        report.elapsed = started.elapsed();
        report.log_summary();
        Ok(report)
    }

    /// Describes what each selected stage would do, without fetching
    pub fn plan(&self, stages: &[Stage]) -> Result<Vec<StagePlan>, MiseError> {
        let mut plans = Vec::new();
        for stage in Stage::ALL.into_iter().filter(|s| stages.contains(s)) {
            let input_total = match self.load_input(stage) {
                Ok(input) => Some(input.len()),
                Err(MiseError::InputUnreadable { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    None
                }
                Err(e) => return Err(e),
            };
            plans.push(StagePlan {
                stage,
                input_total,
                already_done: self.store.already_done(stage)?.len(),
                rejected: self.store.rejected(stage)?.len(),
                cursor: self.cursor(stage),
            });
        }
        Ok(plans)
    }

    /// Builds the work items for `input`, dropping cursor-skipped and
    /// already processed ones
    fn select_items(
        &self,
        stage: Stage,
        input: &[String],
        report: &mut StageReport,
    ) -> Result<Vec<WorkItem>, MiseError> {
        let mut items: Vec<WorkItem> = input
            .iter()
            .enumerate()
            .map(|(i, url)| WorkItem::new(url.clone(), stage, i + 1))
            .collect();

        if let Some(cursor) = self.cursor(stage) {
            let (kept, skipped) = apply_cursor(items, &cursor);
            info!(stage = %stage, cursor = %cursor, skipped, "Applied resume cursor");
            items = kept;
            report.skipped_cursor = skipped;
        }

        if self.config.resume.skip_existing {
            let done = self.store.already_done(stage)?;
            let rejected = self.store.rejected(stage)?;
            items.retain(|item| {
                if done.contains(item.id()) {
                    report.skipped_existing += 1;
                    false
                } else if rejected.contains(item.id()) {
                    report.skipped_rejected += 1;
                    false
                } else {
                    true
                }
            });
            info!(
                stage = %stage,
                skipped_existing = report.skipped_existing,
                skipped_rejected = report.skipped_rejected,
                remaining = items.len(),
                "Filtered already processed items"
            );
        }
        Ok(items)
    }

    fn cursor(&self, stage: Stage) -> Option<ResumeCursor> {
        self.config.cursor_for(stage).map(|cursor| match cursor {
            ResumeCursor::Url(url) => match normalize_url(url) {
                Ok(normalized) => ResumeCursor::Url(normalized.to_string()),
                Err(_) => cursor.clone(),
            },
            ResumeCursor::Ordinal(_) => cursor.clone(),
        })
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            headless: self.config.crawler.headless,
            user_agent: self.config.output.user_agent.clone(),
        }
    }

    fn handler(&self, stage: Stage, filter: Option<ListFilter>) -> Arc<dyn ItemHandler> {
        match (stage, filter) {
            (Stage::Links, Some(filter)) => Arc::new(ListingHandler::new(
                self.store.clone(),
                self.config.listing.clone(),
                filter,
            )),
            (Stage::Details, _) => Arc::new(DetailHandler::new(Arc::clone(&self.extractor))),
            _ => Arc::new(DiscoveryHandler),
        }
    }

    /// Filter applied to the list a stage produces, if it produces one
    fn output_filter(&self, stage: Stage) -> Result<Option<ListFilter>, MiseError> {
        if stage.next().is_none() {
            return Ok(None);
        }
        let path = self.config.blacklist_path();
        let blacklist = load_blacklist(&path)
            .map_err(|source| MiseError::InputUnreadable { path, source })?;

        let filter = match stage {
            Stage::Discovery => ListFilter::blacklist_only(blacklist),
            _ => ListFilter::recipe_links(
                &self.config.site.base_url,
                &self.config.listing,
                blacklist,
            )
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?,
        };
        Ok(Some(filter))
    }

    /// Merges the `links` of every input item's artifact into the next
    /// stage's input list
    fn merge_output(
        &self,
        stage: Stage,
        input: &[String],
        filter: &ListFilter,
    ) -> Result<PathBuf, MiseError> {
        let mut links = Vec::new();
        let mut sources = 0;
        for url in input {
            let id = item_identifier(stage, url);
            match self.store.load(stage, &id) {
                Ok(Some(result)) => {
                    sources += 1;
                    if let Some(found) = result.payload.get("links").and_then(Value::as_array) {
                        links.extend(found.iter().filter_map(Value::as_str).map(str::to_string));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(url = url.as_str(), error = %e, "Skipping unreadable artifact"),
            }
        }

        let merged = filter.apply(&links);
        let name = stage
            .next()
            .map(input_list_name)
            .unwrap_or("merged.txt");
        let path = self.store.write_list(name, &merged)?;
        info!(
            stage = %stage,
            sources,
            links = merged.len(),
            path = %path.display(),
            "Wrote next stage input"
        );
        Ok(path)
    }
}

/// Drops repeated URLs, keeping the first occurrence
fn dedup(input: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
