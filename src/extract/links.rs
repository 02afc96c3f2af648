//! Link extraction for seed and listing pages

use crate::url::resolve_link;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Links found on one page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// Absolute links in document order, without duplicates
    pub links: Vec<String>,

    /// The page shows the end-of-listing marker
    pub exhausted: bool,
}

/// Extracts every followable link from an HTML page
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
///
/// Links are resolved against `base_url`, normalized and de-duplicated in
/// document order.
///
/// # Example
///
/// ```
/// use mise_crawler::extract::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/soup/">Soup</a><a href="/soup/#comments">Comments</a>"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// assert_eq!(extract_links(html, &base), vec!["https://example.com/soup/"]);
/// ```
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    links_in(&document, base_url)
}

/// Extracts the page title from the `<title>` tag
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    title_in(&document)
}

/// Parses one listing page
///
/// # Arguments
///
/// * `html` - The page content
/// * `base_url` - The listing page URL
/// * `end_marker` - Text shown once pagination runs past the last page
pub fn parse_listing(html: &str, base_url: &Url, end_marker: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let exhausted = document
        .root_element()
        .text()
        .any(|text| text.contains(end_marker));

    ListingPage {
        links: if exhausted {
            Vec::new()
        } else {
            links_in(&document, base_url)
        },
        exhausted,
    }
}

fn links_in(document: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(base_url, href))
            {
                let url = url.to_string();
                if seen.insert(url.clone()) {
                    links.push(url);
                }
            }
        }
    }

    links
}

fn title_in(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
