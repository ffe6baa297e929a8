#![forbid(unsafe_code)]

//! Filter, query, and time context passed down to children.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::group::IgnoreParentSettings;

/// An opaque filter; the engine only moves and concatenates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(pub Value);

impl Filter {
    /// Convenience constructor for a single-field phrase filter.
    #[must_use]
    pub fn phrase(field: &str, value: impl Into<Value>) -> Self {
        let value: Value = value.into();
        Self(serde_json::json!({ "query": { "match_phrase": { (field): value } } }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub language: String,
    pub query: String,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            language: String::from("kuery"),
            query: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl TimeRange {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Context a container exposes to its sub-composition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParentContext {
    pub filters: Vec<Filter>,
    pub query: Option<Query>,
    pub time_range: Option<TimeRange>,
}

impl ParentContext {
    /// The parts of this context a group keeps after applying its ignore
    /// flags.
    #[must_use]
    pub fn without_ignored(&self, ignore: &IgnoreParentSettings) -> ParentContext {
        ParentContext {
            filters: if ignore.ignore_filters {
                Vec::new()
            } else {
                self.filters.clone()
            },
            query: if ignore.ignore_query {
                None
            } else {
                self.query.clone()
            },
            time_range: if ignore.ignore_timerange {
                None
            } else {
                self.time_range.clone()
            },
        }
    }
}

/// What a single control fetches with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchContext {
    /// Chained filters first, then the parent's filters.
    pub filters: Vec<Filter>,
    pub query: Option<Query>,
    pub time_range: Option<TimeRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_flags_drop_matching_parts() {
        let parent = ParentContext {
            filters: vec![Filter::phrase("host", "a")],
            query: Some(Query::default()),
            time_range: Some(TimeRange::new("now-15m", "now")),
        };
        let ignore = IgnoreParentSettings {
            ignore_filters: true,
            ignore_timerange: true,
            ..IgnoreParentSettings::default()
        };
        let kept = parent.without_ignored(&ignore);
        assert!(kept.filters.is_empty());
        assert_eq!(kept.query, Some(Query::default()));
        assert_eq!(kept.time_range, None);
    }
}
