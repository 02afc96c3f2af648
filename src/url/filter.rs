//! Stage list loading and link clean-up rules

use crate::config::ListingConfig;
use crate::url::{normalize_url, path_segment_count};
use crate::UrlError;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Parses a newline-delimited URL list
///
/// Blank lines and `#` comments are skipped, every entry is normalized and
/// the result is de-duplicated and sorted, so ordinals are stable across
/// runs. Invalid entries are logged and dropped.
pub fn parse_url_list(content: &str) -> Vec<String> {
    let mut urls = BTreeSet::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match normalize_url(line) {
            Ok(url) => {
                urls.insert(url.to_string());
            }
            Err(e) => {
                tracing::warn!(line = line_no + 1, entry = line, error = %e, "Skipping invalid URL");
            }
        }
    }
    urls.into_iter().collect()
}

/// Reads and parses a URL list file
pub fn load_url_list(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}

/// Reads the blacklist; a missing file is an empty blacklist
pub fn load_blacklist(path: &Path) -> std::io::Result<HashSet<String>> {
    match load_url_list(path) {
        Ok(urls) => Ok(urls.into_iter().collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(e),
    }
}

/// Returns true if two hosts name the same site, ignoring a `www.` prefix
pub fn same_site(site_host: &str, candidate: &str) -> bool {
    let strip = |h: &str| h.trim_start_matches("www.").to_ascii_lowercase();
    strip(site_host) == strip(candidate)
}

/// Filters discovered links before they become the next stage's input
#[derive(Debug, Clone)]
pub struct ListFilter {
    site_host: Option<String>,
    max_path_segments: Option<usize>,
    exclude_patterns: Vec<String>,
    blacklist: HashSet<String>,
}

impl ListFilter {
    /// Filter that only applies the blacklist (discovery output)
    pub fn blacklist_only(blacklist: HashSet<String>) -> Self {
        Self {
            site_host: None,
            max_path_segments: None,
            exclude_patterns: Vec::new(),
            blacklist,
        }
    }

    /// Full clean-up filter for recipe links
    ///
    /// # Arguments
    ///
    /// * `site` - Site root; links on other hosts are dropped
    /// * `listing` - Path depth and exclusion rules
    /// * `blacklist` - URLs never to crawl
    pub fn recipe_links(
        site: &str,
        listing: &ListingConfig,
        blacklist: HashSet<String>,
    ) -> Result<Self, UrlError> {
        let site = normalize_url(site)?;
        let host = site.host_str().ok_or(UrlError::MissingHost)?.to_string();
        Ok(Self {
            site_host: Some(host),
            max_path_segments: Some(listing.max_path_segments),
            exclude_patterns: listing.exclude_patterns.clone(),
            blacklist,
        })
    }

    /// Returns true if `url` should be crawled
    pub fn accepts(&self, url: &str) -> bool {
        let Ok(parsed) = normalize_url(url) else {
            return false;
        };
        if url.contains('#') {
            return false;
        }
        if self.blacklist.contains(parsed.as_str()) || self.blacklist.contains(url) {
            return false;
        }
        if let Some(host) = &self.site_host {
            if !parsed.host_str().map_or(false, |h| same_site(host, h)) {
                return false;
            }
        }
        if let Some(max) = self.max_path_segments {
            if path_segment_count(&parsed) > max {
                return false;
            }
        }
        !self
            .exclude_patterns
            .iter()
            .any(|pattern| parsed.as_str().contains(pattern.as_str()))
    }

    /// Applies the filter and returns a sorted, de-duplicated list
    pub fn apply<I, S>(&self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = BTreeSet::new();
        for url in urls {
            let url = url.as_ref();
            if self.accepts(url) {
                if let Ok(parsed) = normalize_url(url) {
                    kept.insert(parsed.to_string());
                }
            }
        }
        kept.into_iter().collect()
    }
}
