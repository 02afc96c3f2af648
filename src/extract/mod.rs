//! Page extraction
//!
//! Turns fetched page content into structured records. Listing pages yield
//! links; recipe pages yield a recipe record through a [`RecordExtractor`].

mod links;
mod recipe;

pub use links::{extract_links, extract_title, parse_listing, ListingPage};
pub use recipe::RecipeExtractor;

use thiserror::Error;
use url::Url;

/// Errors raised when a loaded page does not contain the expected record
///
/// Extraction errors are permanent: refetching the same page yields the
/// same content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Page is not a recipe: {0}")]
    NotARecipe(String),
}

/// Site-specific content-to-record parser
pub trait RecordExtractor: Send + Sync {
    /// Extracts a record from the page at `url`
    fn extract(&self, url: &Url, html: &str) -> Result<serde_json::Value, ExtractError>;
}
