//! Item store integration tests.
//!
//! Exercises lexical and vector recall, index synchronization on status
//! changes, agent isolation and persistence across reopen.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use agentmem::services::RecallService;
use agentmem::storage::ItemStore;
use agentmem::{CancelToken, Error, ItemStatus, MemoryItem, SearchMode, SearchParams};
use std::sync::Arc;
use tempfile::TempDir;

fn store() -> ItemStore {
    ItemStore::in_memory("a").unwrap()
}

// ============================================================================
// Lexical recall
// ============================================================================

#[test]
fn test_fts_recall_then_forget() {
    let store = Arc::new(store());
    let cancel = CancelToken::new();
    let item = store
        .upsert(
            MemoryItem::new("preference", "Tone", "be concise and proactive")
                .with_importance(4)
                .with_confidence(0.9),
            &cancel,
        )
        .unwrap();

    let recall = RecallService::new(Arc::clone(&store));
    let results = recall
        .search(&SearchParams::query("proactive"), &cancel)
        .unwrap();
    assert_eq!(results.mode, SearchMode::Fts);
    assert_eq!(results.items.len(), 1);
    assert_eq!(results.items[0].id, item.id);

    assert!(store.forget(&item.id, &cancel).unwrap());
    let results = recall
        .search(&SearchParams::query("proactive"), &cancel)
        .unwrap();
    assert!(results.items.is_empty());
}

#[test]
fn test_search_tokens_are_and_joined() {
    let store = store();
    let cancel = CancelToken::new();
    store
        .upsert(MemoryItem::new("note", "Deploy", "deploy on fridays"), &cancel)
        .unwrap();
    store
        .upsert(MemoryItem::new("note", "Review", "review on mondays"), &cancel)
        .unwrap();

    let hits = store
        .search(&SearchParams::query("deploy fridays"), &cancel)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Deploy");

    let hits = store
        .search(&SearchParams::query("deploy mondays"), &cancel)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_search_tolerates_fts_syntax() {
    let store = store();
    let cancel = CancelToken::new();
    store
        .upsert(MemoryItem::new("note", "Quote", "say \"hello\" AND OR"), &cancel)
        .unwrap();

    let hits = store
        .search(&SearchParams::query("\"hello\" OR"), &cancel)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(
        store
            .search(&SearchParams::query("\"\"\""), &cancel)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_empty_query_orders_by_importance() {
    let store = store();
    let cancel = CancelToken::new();
    for importance in [2, 5, 3] {
        store
            .upsert(
                MemoryItem::new("note", format!("imp {importance}"), "body")
                    .with_importance(importance),
                &cancel,
            )
            .unwrap();
    }

    let hits = store.search(&SearchParams::default(), &cancel).unwrap();
    let order: Vec<i64> = hits.iter().map(|i| i.importance).collect();
    assert_eq!(order, vec![5, 3, 2]);

    let hits = store
        .search(&SearchParams::default().with_min_importance(3), &cancel)
        .unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_search_limit_is_clamped() {
    let store = store();
    let cancel = CancelToken::new();
    for i in 0..60 {
        store
            .upsert(MemoryItem::new("note", format!("item {i}"), "shared words"), &cancel)
            .unwrap();
    }
    let hits = store
        .search(&SearchParams::query("shared").with_limit(500), &cancel)
        .unwrap();
    assert_eq!(hits.len(), 50);
    let hits = store.search(&SearchParams::query("shared"), &cancel).unwrap();
    assert_eq!(hits.len(), 8);
}

// ============================================================================
// Vector recall
// ============================================================================

#[test]
fn test_embedding_rank() {
    let store = store();
    let cancel = CancelToken::new();
    let a = store
        .upsert(MemoryItem::new("note", "A", "alpha"), &cancel)
        .unwrap();
    let b = store
        .upsert(MemoryItem::new("note", "B", "beta"), &cancel)
        .unwrap();
    store.upsert_embedding(&a.id, "m", &[1.0, 0.0], &cancel).unwrap();
    store.upsert_embedding(&b.id, "m", &[0.0, 1.0], &cancel).unwrap();

    let hits = store
        .search_by_embedding(&[0.9, 0.1], 5, 1, ItemStatus::Active, &cancel)
        .unwrap();
    assert_eq!(hits[0].item.id, a.id);
    assert!(hits[0].score > 0.9);
    assert!(hits.iter().all(|h| h.score > 0.0));
}

#[test]
fn test_orthogonal_candidates_are_dropped() {
    let store = store();
    let cancel = CancelToken::new();
    let a = store
        .upsert(MemoryItem::new("note", "A", "alpha"), &cancel)
        .unwrap();
    store.upsert_embedding(&a.id, "m", &[0.0, 1.0], &cancel).unwrap();

    let hits = store
        .search_by_embedding(&[1.0, 0.0], 5, 1, ItemStatus::Active, &cancel)
        .unwrap();
    assert!(hits.is_empty());
    assert!(
        store
            .search_by_embedding(&[], 5, 1, ItemStatus::Active, &cancel)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_embedding_rejects_bad_input() {
    let store = store();
    let cancel = CancelToken::new();
    let a = store
        .upsert(MemoryItem::new("note", "A", "alpha"), &cancel)
        .unwrap();

    assert!(matches!(
        store.upsert_embedding(&a.id, "m", &[], &cancel),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        store.upsert_embedding(&a.id, "m", &[f32::NAN], &cancel),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        store.upsert_embedding("missing", "m", &[1.0], &cancel),
        Err(Error::NotFound(_))
    ));
}

// ============================================================================
// Index synchronization
// ============================================================================

#[test]
fn test_indexes_follow_status() {
    let store = store();
    let cancel = CancelToken::new();
    let item = store
        .upsert(MemoryItem::new("note", "Idx", "indexed body"), &cancel)
        .unwrap();
    store.upsert_embedding(&item.id, "m", &[1.0, 0.0], &cancel).unwrap();

    let presence = store.index_presence(&item.id).unwrap();
    assert!(presence.fts);
    assert!(presence.embedding);

    assert!(store.archive(&item.id, &cancel).unwrap());
    let presence = store.index_presence(&item.id).unwrap();
    assert!(!presence.fts);
    assert!(!presence.embedding);

    let stored = store.get(&item.id, &cancel).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Archived);
    assert!(!store.forget(&item.id, &cancel).unwrap());
}

#[test]
fn test_reactivation_restores_fts() {
    let store = store();
    let cancel = CancelToken::new();
    let item = store
        .upsert(MemoryItem::new("note", "Back", "returning item"), &cancel)
        .unwrap();
    store.forget(&item.id, &cancel).unwrap();

    let mut revived = store.get(&item.id, &cancel).unwrap().unwrap();
    revived.status = ItemStatus::Active;
    store.update(revived, &cancel).unwrap();

    assert!(store.index_presence(&item.id).unwrap().fts);
    let hits = store.search(&SearchParams::query("returning"), &cancel).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn test_upsert_replaces_fts_content() {
    let store = store();
    let cancel = CancelToken::new();
    let item = store
        .upsert(MemoryItem::new("note", "Old", "original wording"), &cancel)
        .unwrap();
    let mut changed = item.clone();
    changed.content = "replacement wording".to_string();
    store.upsert(changed, &cancel).unwrap();

    assert!(store.search(&SearchParams::query("original"), &cancel).unwrap().is_empty());
    assert_eq!(
        store
            .search(&SearchParams::query("replacement"), &cancel)
            .unwrap()
            .len(),
        1
    );
}

// ============================================================================
// Writes, ownership, persistence
// ============================================================================

#[test]
fn test_upsert_normalizes_and_stamps() {
    let store = store();
    let cancel = CancelToken::new();
    let saved = store
        .upsert(
            MemoryItem::new("  ", " Title ", " Body ")
                .with_importance(9)
                .with_confidence(-1.0),
            &cancel,
        )
        .unwrap();

    assert!(!saved.id.is_empty());
    assert_eq!(saved.agent_id, "a");
    assert_eq!(saved.kind, "note");
    assert_eq!(saved.title, "Title");
    assert_eq!(saved.importance, 5);
    assert!((saved.confidence - 0.7).abs() < f64::EPSILON);
    assert!(saved.updated_at >= saved.created_at);

    let again = store.upsert(saved.clone(), &cancel).unwrap();
    assert_eq!(again.created_at, saved.created_at);
    assert_eq!(store.get(&saved.id, &cancel).unwrap().unwrap().id, saved.id);
}

#[test]
fn test_active_item_requires_title_and_content() {
    let store = store();
    let err = store
        .upsert(MemoryItem::new("note", "", "body"), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_update_missing_is_not_found() {
    let store = store();
    let err = store
        .update(
            MemoryItem::new("note", "t", "c").with_id("nope"),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_agents_are_isolated() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("shared.db");
    let cancel = CancelToken::new();
    let a = ItemStore::open(&db, "a").unwrap();
    let b = ItemStore::open(&db, "b").unwrap();

    let item = a
        .upsert(MemoryItem::new("note", "Secret", "only for a"), &cancel)
        .unwrap();

    assert!(b.get(&item.id, &cancel).unwrap().is_none());
    assert!(b.search(&SearchParams::query("secret"), &cancel).unwrap().is_empty());
    assert!(!b.forget(&item.id, &cancel).unwrap());
    assert!(matches!(b.upsert(item.clone(), &cancel), Err(Error::PolicyDenied(_))));

    let mut foreign = item.clone();
    foreign.agent_id = String::new();
    assert!(matches!(b.upsert(foreign.clone(), &cancel), Err(Error::PolicyDenied(_))));
    assert!(matches!(b.update(foreign, &cancel), Err(Error::NotFound(_))));
}

#[test]
fn test_reopen_persists_items() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("nested").join("memory.db");
    let cancel = CancelToken::new();
    let id = {
        let store = ItemStore::open(&db, "a").unwrap();
        store
            .upsert(MemoryItem::new("fact", "Persisted", "survives reopen"), &cancel)
            .unwrap()
            .id
    };

    let store = ItemStore::open(&db, "a").unwrap();
    let item = store.get(&id, &cancel).unwrap().unwrap();
    assert_eq!(item.title, "Persisted");
    assert_eq!(
        store.search(&SearchParams::query("survives"), &cancel).unwrap().len(),
        1
    );
}

#[test]
fn test_health_counts_by_status() {
    let store = store();
    let cancel = CancelToken::new();
    let ids: Vec<String> = (0..3)
        .map(|i| {
            store
                .upsert(MemoryItem::new("note", format!("t{i}"), "c"), &cancel)
                .unwrap()
                .id
        })
        .collect();
    store.forget(&ids[0], &cancel).unwrap();
    store.archive(&ids[1], &cancel).unwrap();

    let health = store.health(&cancel).unwrap();
    assert_eq!(health.total_items, 3);
    assert_eq!(health.active_items, 1);
    assert_eq!(health.forgotten_items, 1);
    assert_eq!(health.archived_items, 1);
    assert_eq!(health.db_path, ":memory:");
}

#[test]
fn test_cancelled_token_stops_writes() {
    let store = store();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = store
        .upsert(MemoryItem::new("note", "t", "c"), &cancel)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(store.health(&CancelToken::new()).unwrap().total_items, 0);
}
