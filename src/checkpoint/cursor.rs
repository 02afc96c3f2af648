use crate::state::WorkItem;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Explicit resume point within a stage's sorted input
///
/// Items before the cursor are dropped regardless of whether their artifact
/// exists. In TOML an integer is an ordinal and a string is a URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ResumeCursor {
    /// 1-based position in the sorted input
    Ordinal(usize),
    /// First URL to process
    Url(String),
}

impl FromStr for ResumeCursor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(n) => Self::Ordinal(n),
            Err(_) => Self::Url(s.to_string()),
        })
    }
}

impl fmt::Display for ResumeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(n) => write!(f, "#{}", n),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Drops the items before `cursor`
///
/// Items must carry the ordinals of the full sorted input, so this runs
/// before any skip-existing filtering.
///
/// # Returns
///
/// The kept items and the number dropped. A URL cursor that matches no
/// item keeps everything.
pub fn apply_cursor(items: Vec<WorkItem>, cursor: &ResumeCursor) -> (Vec<WorkItem>, usize) {
    let start = match cursor {
        ResumeCursor::Ordinal(n) => *n,
        ResumeCursor::Url(url) => match items.iter().find(|item| item.url() == url) {
            Some(item) => item.ordinal(),
            None => {
                tracing::warn!(
                    cursor = %url,
                    "Resume URL not found in stage input, starting from the beginning"
                );
                return (items, 0);
            }
        },
    };

    if start > items.len() {
        tracing::warn!(
            cursor = start,
            total = items.len(),
            "Resume position is past the end of the stage input"
        );
    }

    let total = items.len();
    let kept: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| item.ordinal() >= start)
        .collect();
    let skipped = total - kept.len();
    (kept, skipped)
}
