//! URL handling module
//!
//! This module provides URL normalization, link resolution, stage list
//! loading and the link clean-up rules applied between stages.

mod filter;
mod normalize;

pub use filter::{load_blacklist, load_url_list, parse_url_list, same_site, ListFilter};
pub use normalize::{normalize_url, path_segment_count, resolve_link};
