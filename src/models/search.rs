//! Search parameters and results.

use super::{ItemStatus, MAX_IMPORTANCE, MIN_IMPORTANCE, MemoryItem};
use serde::{Deserialize, Serialize};

/// Result limit used when none is given.
pub const DEFAULT_SEARCH_LIMIT: usize = 8;

/// Largest result limit.
pub const MAX_SEARCH_LIMIT: usize = 50;

/// How a result list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Lexical (FTS5/BM25) only.
    #[default]
    Fts,
    /// Vector candidates merged ahead of lexical ones.
    SemanticHybrid,
}

impl SearchMode {
    /// Returns the mode label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fts => "fts",
            Self::SemanticHybrid => "semantic_hybrid",
        }
    }
}

/// Parameters for item recall.
///
/// Zero `limit` / `min_importance` mean "use the default".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free-text query; empty lists by importance.
    #[serde(default)]
    pub query: String,
    /// Maximum results.
    #[serde(default)]
    pub limit: usize,
    /// Minimum importance.
    #[serde(default)]
    pub min_importance: i64,
    /// Status to search within.
    #[serde(default)]
    pub status: ItemStatus,
}

impl SearchParams {
    /// Creates parameters for a query with defaults elsewhere.
    #[must_use]
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the minimum importance.
    #[must_use]
    pub const fn with_min_importance(mut self, min_importance: i64) -> Self {
        self.min_importance = min_importance;
        self
    }

    /// Returns normalized parameters.
    ///
    /// Trims the query; limit defaults to 8 and is clamped to 1..=50;
    /// `min_importance` defaults to 1 and is clamped to 1..=5.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let limit = if self.limit == 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            self.limit.min(MAX_SEARCH_LIMIT)
        };
        let min_importance = if self.min_importance <= 0 {
            MIN_IMPORTANCE
        } else {
            self.min_importance.min(MAX_IMPORTANCE)
        };
        Self {
            query: self.query.trim().to_string(),
            limit,
            min_importance,
            status: self.status,
        }
    }
}

/// A ranked result list with the mode that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    /// Ranked items.
    pub items: Vec<MemoryItem>,
    /// Retrieval mode label.
    pub mode: SearchMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = SearchParams::default().normalized();
        assert_eq!(p.limit, 8);
        assert_eq!(p.min_importance, 1);
        assert_eq!(p.status, ItemStatus::Active);
    }

    #[test]
    fn test_clamps() {
        let p = SearchParams::query("  x  ")
            .with_limit(500)
            .with_min_importance(9)
            .normalized();
        assert_eq!(p.query, "x");
        assert_eq!(p.limit, 50);
        assert_eq!(p.min_importance, 5);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(SearchMode::Fts.as_str(), "fts");
        assert_eq!(
            serde_json::to_value(SearchMode::SemanticHybrid).unwrap(),
            "semantic_hybrid"
        );
    }
}
