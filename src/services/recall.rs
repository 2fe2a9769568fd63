//! Memory recall (search) service.
//!
//! Lexical recall always runs. When an embedder is configured and the query
//! is non-empty, vector candidates are merged ahead of the lexical list.
//! Any embedder failure degrades to the lexical result.

use crate::cancel::CancelToken;
use crate::embedding::Embedder;
use crate::models::{ItemStatus, MemoryItem, SearchMode, SearchParams, SearchResults};
use crate::observability::metrics::RECALL_SEARCHES;
use crate::storage::ItemStore;
use crate::{ErrorKind, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Service for searching an agent's items.
pub struct RecallService {
    store: Arc<ItemStore>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl RecallService {
    /// Creates a lexical-only recall service.
    #[must_use]
    pub fn new(store: Arc<ItemStore>) -> Self {
        Self {
            store,
            embedder: None,
        }
    }

    /// Adds an embedder for hybrid recall.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Returns true if hybrid recall is possible.
    #[must_use]
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Searches for items.
    ///
    /// The result is labeled [`SearchMode::SemanticHybrid`] only when the
    /// vector pass contributed at least one candidate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cancelled`] if `cancel` fires, or
    /// [`crate::Error::OperationFailed`] if lexical recall fails.
    #[instrument(skip(self, params, cancel), fields(operation = "recall", agent_id = %self.store.agent_id()))]
    pub fn search(&self, params: &SearchParams, cancel: &CancelToken) -> Result<SearchResults> {
        let p = params.normalized();
        let lexical = self.store.search(&p, cancel)?;

        let semantic = match &self.embedder {
            Some(embedder) if !p.query.is_empty() && p.status == ItemStatus::Active => {
                self.semantic_candidates(embedder.as_ref(), &p, cancel)?
            },
            _ => Vec::new(),
        };

        let results = if semantic.is_empty() {
            SearchResults {
                items: lexical,
                mode: SearchMode::Fts,
            }
        } else {
            SearchResults {
                items: merge_ranked(semantic, lexical, p.limit),
                mode: SearchMode::SemanticHybrid,
            }
        };

        metrics::counter!(RECALL_SEARCHES, "mode" => results.mode.as_str()).increment(1);
        debug!(
            mode = results.mode.as_str(),
            result_count = results.items.len(),
            "Recall completed"
        );
        Ok(results)
    }

    /// Vector candidates for the query; empty on any non-cancellation failure.
    fn semantic_candidates(
        &self,
        embedder: &dyn Embedder,
        p: &SearchParams,
        cancel: &CancelToken,
    ) -> Result<Vec<MemoryItem>> {
        let attempt = embedder.embed(&p.query, cancel).and_then(|vector| {
            self.store
                .search_by_embedding(&vector, p.limit, p.min_importance, ItemStatus::Active, cancel)
        });
        match attempt {
            Ok(scored) => Ok(scored.into_iter().map(|s| s.item).collect()),
            Err(e) if e.kind() == ErrorKind::Timeout => Err(e),
            Err(e) => {
                warn!(error = %e, "Vector recall failed, using lexical results");
                Ok(Vec::new())
            },
        }
    }
}

/// Puts `first` ahead of `second`, dropping repeated ids, up to `limit`.
fn merge_ranked(first: Vec<MemoryItem>, second: Vec<MemoryItem>, limit: usize) -> Vec<MemoryItem> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|item| seen.insert(item.id.clone()))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Fixed(Vec<f32>);

    impl Embedder for Fixed {
        fn model_id(&self) -> &str {
            "fixed"
        }

        fn embed(&self, _text: &str, _cancel: &CancelToken) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Embedder for Broken {
        fn model_id(&self) -> &str {
            "broken"
        }

        fn embed(&self, _text: &str, _cancel: &CancelToken) -> Result<Vec<f32>> {
            Err(Error::Transport {
                operation: "embeddings".to_string(),
                cause: "connection refused".to_string(),
            })
        }
    }

    fn seeded() -> (Arc<ItemStore>, MemoryItem, MemoryItem) {
        let cancel = CancelToken::new();
        let store = Arc::new(ItemStore::in_memory("agent").unwrap());
        let a = store
            .upsert(MemoryItem::new("note", "Alpha", "shared alpha words"), &cancel)
            .unwrap();
        let b = store
            .upsert(MemoryItem::new("note", "Beta", "shared beta words"), &cancel)
            .unwrap();
        store.upsert_embedding(&a.id, "fixed", &[1.0, 0.0], &cancel).unwrap();
        store.upsert_embedding(&b.id, "fixed", &[0.0, 1.0], &cancel).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_lexical_only() {
        let (store, _, _) = seeded();
        let results = RecallService::new(store)
            .search(&SearchParams::query("shared"), &CancelToken::new())
            .unwrap();
        assert_eq!(results.mode, SearchMode::Fts);
        assert_eq!(results.items.len(), 2);
    }

    #[test]
    fn test_hybrid_puts_vector_hits_first() {
        let (store, _, b) = seeded();
        let results = RecallService::new(store)
            .with_embedder(Arc::new(Fixed(vec![0.1, 0.9])))
            .search(&SearchParams::query("alpha"), &CancelToken::new())
            .unwrap();
        assert_eq!(results.mode, SearchMode::SemanticHybrid);
        assert_eq!(results.items[0].id, b.id);
        let ids: HashSet<_> = results.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), results.items.len());
    }

    #[test]
    fn test_embedder_failure_degrades() {
        let (store, a, _) = seeded();
        let results = RecallService::new(store)
            .with_embedder(Arc::new(Broken))
            .search(&SearchParams::query("alpha"), &CancelToken::new())
            .unwrap();
        assert_eq!(results.mode, SearchMode::Fts);
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].id, a.id);
    }

    #[test]
    fn test_no_vector_hits_stays_fts() {
        let (store, _, _) = seeded();
        let results = RecallService::new(store)
            .with_embedder(Arc::new(Fixed(vec![-1.0, -1.0])))
            .search(&SearchParams::query("alpha"), &CancelToken::new())
            .unwrap();
        assert_eq!(results.mode, SearchMode::Fts);
    }

    #[test]
    fn test_empty_query_skips_vector_pass() {
        let (store, _, _) = seeded();
        let results = RecallService::new(store)
            .with_embedder(Arc::new(Fixed(vec![1.0, 0.0])))
            .search(&SearchParams::default(), &CancelToken::new())
            .unwrap();
        assert_eq!(results.mode, SearchMode::Fts);
        assert_eq!(results.items.len(), 2);
    }

    #[test]
    fn test_merge_respects_limit() {
        let items: Vec<MemoryItem> = (0..5)
            .map(|i| MemoryItem::new("note", format!("t{i}"), "c").with_id(format!("id{i}")))
            .collect();
        let merged = merge_ranked(items[..3].to_vec(), items[1..].to_vec(), 4);
        let ids: Vec<&str> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["id0", "id1", "id2", "id3"]);
    }
}
