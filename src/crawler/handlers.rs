//! Stage handlers
//!
//! One [`ItemHandler`] per stage turns a fetched page into the payload the
//! pool persists as the item's artifact.

use crate::checkpoint::CheckpointStore;
use crate::config::ListingConfig;
use crate::crawler::pool::ItemHandler;
use crate::crawler::retry::{AttemptError, ItemError};
use crate::crawler::worker::SlotFetcher;
use crate::extract::{extract_links, extract_title, parse_listing, RecordExtractor};
use crate::state::WorkItem;
use crate::url::ListFilter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

fn parse_item_url(item: &WorkItem) -> Result<Url, ItemError> {
    Url::parse(item.url()).map_err(|e| {
        AttemptError::PermanentExtraction(format!("invalid URL {}: {}", item.url(), e)).into()
    })
}

/// Discovery: collects every link of a seed page
#[derive(Debug, Default, Clone)]
pub struct DiscoveryHandler;

#[async_trait]
impl ItemHandler for DiscoveryHandler {
    async fn handle(&self, item: &WorkItem, fetcher: &mut SlotFetcher) -> Result<Value, ItemError> {
        let base = parse_item_url(item)?;
        let html = fetcher.fetch(item.url()).await?;

        let links = extract_links(&html, &base);
        if links.is_empty() {
            return Err(AttemptError::PermanentExtraction("seed page has no links".to_string()).into());
        }
        debug!(url = item.url(), links = links.len(), "Seed page parsed");

        Ok(json!({
            "title": extract_title(&html),
            "links": links,
        }))
    }
}

/// Saved result of one listing page
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SavedPage {
    url: String,
    links: Vec<String>,
}

/// Why pagination of a category ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    EndMarker,
    EmptyPages,
    NotFound,
    MaxPages,
}

/// Links: walks the paginated listing of one category
///
/// Page `n` of category `c` lives at `c/page/<n>/`. Every page is saved as
/// it is read, so a retried or resumed category picks up where it stopped.
pub struct ListingHandler {
    store: CheckpointStore,
    listing: ListingConfig,
    filter: ListFilter,
}

impl ListingHandler {
    pub fn new(store: CheckpointStore, listing: ListingConfig, filter: ListFilter) -> Self {
        Self {
            store,
            listing,
            filter,
        }
    }

    fn page_url(category: &Url, page: u32) -> Result<Url, ItemError> {
        let mut base = category.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.join(&format!("page/{}/", page)).map_err(|e| {
            AttemptError::PermanentExtraction(format!("cannot build page URL: {}", e)).into()
        })
    }

    async fn read_page(
        &self,
        item: &WorkItem,
        page: u32,
        url: &Url,
        fetcher: &mut SlotFetcher,
    ) -> Result<Option<SavedPage>, ItemError> {
        match self.store.load_page(item.stage(), item.id(), page) {
            Ok(Some(value)) => match serde_json::from_value::<SavedPage>(value) {
                Ok(saved) => {
                    debug!(url = %url, page, "Reusing saved listing page");
                    return Ok(Some(saved));
                }
                Err(e) => warn!(url = %url, page, error = %e, "Ignoring unreadable saved page"),
            },
            Ok(None) => {}
            Err(e) => warn!(url = %url, page, error = %e, "Ignoring unreadable saved page"),
        }

        let html = fetcher.fetch(url.as_str()).await?;
        let listing = parse_listing(&html, url, &self.listing.end_marker);
        if listing.exhausted {
            return Ok(None);
        }

        let saved = SavedPage {
            url: url.to_string(),
            links: self.filter.apply(&listing.links),
        };
        let value = serde_json::to_value(&saved)
            .map_err(|e| AttemptError::Persist(e.to_string()))?;
        self.store
            .persist_page(item.stage(), item.id(), page, &value)
            .map_err(|e| AttemptError::Persist(e.to_string()))?;
        Ok(Some(saved))
    }
}

#[async_trait]
impl ItemHandler for ListingHandler {
    async fn handle(&self, item: &WorkItem, fetcher: &mut SlotFetcher) -> Result<Value, ItemError> {
        let category = parse_item_url(item)?;
        let mut links = BTreeSet::new();
        let mut consecutive_empty = 0;
        let mut pages = 0;
        let mut stop = StopReason::MaxPages;

        for page in 1..=self.listing.max_pages {
            let url = Self::page_url(&category, page)?;
            let saved = match self.read_page(item, page, &url, fetcher).await {
                Ok(saved) => saved,
                Err(ItemError::Attempt(AttemptError::PermanentExtraction(e))) if page > 1 => {
                    debug!(url = %url, error = %e, "Listing page missing, end of category");
                    stop = StopReason::NotFound;
                    break;
                }
                Err(e) => return Err(e),
            };

            let Some(saved) = saved else {
                stop = StopReason::EndMarker;
                break;
            };
            pages = page;

            if saved.links.is_empty() {
                consecutive_empty += 1;
                if consecutive_empty >= self.listing.max_consecutive_empty {
                    warn!(
                        url = item.url(),
                        pages = consecutive_empty,
                        "Too many listing pages without links, stopping category"
                    );
                    stop = StopReason::EmptyPages;
                    break;
                }
            } else {
                consecutive_empty = 0;
                links.extend(saved.links);
            }
        }

        info!(url = item.url(), pages, links = links.len(), "Category listed");
        Ok(json!({
            "pages": pages,
            "stop": stop,
            "links": links,
        }))
    }
}

/// Details: turns a recipe page into a record
pub struct DetailHandler {
    extractor: Arc<dyn RecordExtractor>,
}

impl DetailHandler {
    pub fn new(extractor: Arc<dyn RecordExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl ItemHandler for DetailHandler {
    async fn handle(&self, item: &WorkItem, fetcher: &mut SlotFetcher) -> Result<Value, ItemError> {
        let url = parse_item_url(item)?;
        let html = fetcher.fetch(item.url()).await?;
        Ok(self.extractor.extract(&url, &html)?)
    }
}
