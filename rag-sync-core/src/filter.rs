//! Scan-time filtering of remote items (extensions, hidden paths, dates, sizes).
//!
//! A filtered listing is partial by construction, which is why the reconciler
//! never infers deletions from it unless `delete_missing` is set.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::RemoteItem;
use crate::error::FilterError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Allowed extensions; empty allows everything.
    pub extensions: Vec<String>,
    /// Regular expressions matched against the item path.
    pub exclude_patterns: Vec<String>,
    pub exclude_hidden: bool,
    pub modified_since: Option<DateTime<Utc>>,
    pub skip_empty: bool,
    pub max_size_bytes: Option<u64>,
    pub limit: Option<usize>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            exclude_hidden: true,
            modified_since: None,
            skip_empty: true,
            max_size_bytes: None,
            limit: None,
        }
    }
}

/// Why an item was dropped from the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Extension,
    Excluded,
    Hidden,
    TooOld,
    Empty,
    TooLarge,
    OverLimit,
}

#[derive(Debug, Clone)]
pub struct ItemFilter {
    extensions: Vec<String>,
    exclude: Vec<Regex>,
    exclude_hidden: bool,
    modified_since: Option<DateTime<Utc>>,
    skip_empty: bool,
    max_size_bytes: Option<u64>,
    limit: Option<usize>,
}

/// Items kept by [`ItemFilter::apply`] and the number rejected.
#[derive(Debug, Clone, Default)]
pub struct Filtered {
    pub kept: Vec<RemoteItem>,
    pub rejected: usize,
}

impl ItemFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, FilterError> {
        let exclude = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| FilterError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let extensions = config
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Ok(ItemFilter {
            extensions,
            exclude,
            exclude_hidden: config.exclude_hidden,
            modified_since: config.modified_since,
            skip_empty: config.skip_empty,
            max_size_bytes: config.max_size_bytes,
            limit: config.limit,
        })
    }

    /// Filter that keeps everything.
    pub fn allow_all() -> Self {
        ItemFilter {
            extensions: Vec::new(),
            exclude: Vec::new(),
            exclude_hidden: false,
            modified_since: None,
            skip_empty: false,
            max_size_bytes: None,
            limit: None,
        }
    }

    /// Reason the item would be rejected, ignoring `limit`.
    pub fn check(&self, item: &RemoteItem) -> Option<Rejection> {
        if !self.extensions.is_empty() {
            match item.extension() {
                Some(ext) if self.extensions.contains(&ext) => {}
                _ => return Some(Rejection::Extension),
            }
        }
        if self.exclude_hidden && is_hidden(&item.path) {
            return Some(Rejection::Hidden);
        }
        if self.exclude.iter().any(|re| re.is_match(&item.path)) {
            return Some(Rejection::Excluded);
        }
        if let (Some(since), Some(modified)) = (self.modified_since, item.modified_at) {
            if modified < since {
                return Some(Rejection::TooOld);
            }
        }
        if self.skip_empty && item.size == Some(0) {
            return Some(Rejection::Empty);
        }
        if let (Some(max), Some(size)) = (self.max_size_bytes, item.size) {
            if size > max {
                return Some(Rejection::TooLarge);
            }
        }
        None
    }

    pub fn apply(&self, items: Vec<RemoteItem>) -> Filtered {
        let mut out = Filtered::default();
        for item in items {
            let rejection = match self.check(&item) {
                None if self.limit.is_some_and(|limit| out.kept.len() >= limit) => {
                    Some(Rejection::OverLimit)
                }
                other => other,
            };
            match rejection {
                Some(reason) => {
                    debug!(id = %item.id, ?reason, "Item filtered out");
                    out.rejected += 1;
                }
                None => out.kept.push(item),
            }
        }
        out
    }
}

fn is_hidden(path: &str) -> bool {
    path.split(['/', '\\'])
        .any(|part| part.starts_with('.') && part != "." && part != "..")
}
