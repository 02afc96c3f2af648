use crate::UrlError;
use url::Url;

/// Tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

/// Link schemes that never point at a page
const IGNORED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Normalizes a URL so the same page always maps to the same string
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require http or https and a host
/// 3. Collapse repeated slashes in the path, keeping a trailing slash
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters and sort the rest
/// 6. Remove empty query string (trailing ?)
///
/// The trailing slash is significant on recipe sites (`/lemon-bars/` and
/// `/lemon-bars` can be different resources) so it is never touched.
///
/// # Examples
///
/// ```
/// use mise_crawler::url::normalize_url;
///
/// let url = normalize_url("https://Example.com//dinner/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/dinner/");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    let path = collapse_slashes(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Resolves an `href` found on `base` into a normalized absolute URL
///
/// # Returns
///
/// * `Some(Url)` - A crawlable http(s) URL
/// * `None` - Empty, fragment-only, non-page or malformed links
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if IGNORED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return None;
    }

    let joined = base.join(href).ok()?;
    normalize_url(joined.as_str()).ok()
}

/// Number of non-empty path segments
pub fn path_segment_count(url: &Url) -> usize {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
