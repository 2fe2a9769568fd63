//! Maintenance service.
//!
//! Finds duplicate, stale and doubtful active items. Duplicates and stale
//! items are archived (unless dry run) and the database is compacted;
//! doubtful items are only reported.

use super::path_manager::AgentPaths;
use crate::cancel::CancelToken;
use crate::journal::Journal;
use crate::models::{Event, EventType, ItemStatus, MaintenanceReport, MemoryItem, format_timestamp};
use crate::observability::metrics::MAINTENANCE_RUNS;
use crate::storage::ItemStore;
use crate::storage::artifacts::{latest_artifact, write_artifact};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};

/// Stale threshold when none is given.
pub const DEFAULT_STALE_DAYS: i64 = crate::config::DEFAULT_STALE_DAYS;

/// Smallest stale threshold honoured.
pub const MIN_STALE_DAYS: i64 = 7;

/// Age after which important items need verification.
pub const VERIFICATION_AGE_DAYS: i64 = 30;

/// Confidence below which important items need verification.
pub const VERIFICATION_CONFIDENCE: f64 = 0.6;

/// Items scanned per pass.
pub const MAX_SCANNED_ITEMS: usize = 10_000;

/// Content prefix compared for duplicates, in characters.
const DEDUP_CONTENT_CHARS: usize = 160;

/// Service that keeps an agent's item set tidy.
pub struct MaintenanceService {
    paths: AgentPaths,
    store: Arc<ItemStore>,
    journal: Arc<Journal>,
}

/// Candidate sets for one pass, each sorted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Candidates {
    /// Non-keeper members of duplicate groups.
    pub duplicates: BTreeSet<String>,
    /// Old, unimportant items that are not duplicates.
    pub stale: BTreeSet<String>,
    /// Important items that are old or low-confidence.
    pub verification: BTreeSet<String>,
}

impl MaintenanceService {
    /// Creates a maintenance service for one agent.
    #[must_use]
    pub const fn new(paths: AgentPaths, store: Arc<ItemStore>, journal: Arc<Journal>) -> Self {
        Self {
            paths,
            store,
            journal,
        }
    }

    /// The most recent maintenance report, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the directory cannot be listed.
    pub fn latest(&self) -> Result<Option<MaintenanceReport>> {
        latest_artifact(&self.paths.maintenance_dir())
    }

    /// Runs one maintenance pass.
    ///
    /// `stale_days <= 0` means [`DEFAULT_STALE_DAYS`]; values below
    /// [`MIN_STALE_DAYS`] are raised to it.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Cancelled`] if `cancel` fires
    /// - [`crate::Error::OperationFailed`] on storage or journal failure
    #[instrument(skip(self, cancel), fields(operation = "maintenance", agent_id = %self.paths.agent_id()))]
    pub fn run(&self, stale_days: i64, dry_run: bool, cancel: &CancelToken) -> Result<MaintenanceReport> {
        cancel.check("maintenance")?;
        let requested_days = if stale_days <= 0 {
            DEFAULT_STALE_DAYS
        } else {
            stale_days
        };
        let effective_days = requested_days.max(MIN_STALE_DAYS);
        let now = Utc::now();

        let before = self.store.health(cancel)?;
        let items = self
            .store
            .list(ItemStatus::Active, MAX_SCANNED_ITEMS, cancel)?;
        let candidates = find_candidates(&items, now, effective_days);

        let mut compacted = false;
        if !dry_run {
            for id in candidates.duplicates.iter().chain(&candidates.stale) {
                cancel.check("maintenance")?;
                self.store.archive(id, cancel)?;
            }
            self.store.vacuum(cancel)?;
            compacted = true;
        }
        let after = self.store.health(cancel)?;

        let mut metadata = Map::new();
        metadata.insert("dry_run".to_string(), Value::Bool(dry_run));
        metadata.insert("stale_days".to_string(), Value::from(requested_days));
        metadata.insert("effective_stale_days".to_string(), Value::from(effective_days));
        metadata.insert("scanned_items".to_string(), Value::from(items.len()));
        metadata.insert(
            "stale_cutoff".to_string(),
            Value::String(format_timestamp(&(now - Duration::days(effective_days)))),
        );
        metadata.insert(
            "verification_cutoff".to_string(),
            Value::String(format_timestamp(&(now - Duration::days(VERIFICATION_AGE_DAYS)))),
        );

        let report = MaintenanceReport {
            id: uuid::Uuid::now_v7().to_string(),
            agent_id: self.paths.agent_id().to_string(),
            created_at: now,
            deduplicated_count: candidates.duplicates.len(),
            archived_stale_count: candidates.stale.len(),
            verification_count: candidates.verification.len(),
            compacted,
            before,
            after,
            verification_item_ids: candidates.verification.into_iter().collect(),
            archived_duplicate_ids: candidates.duplicates.into_iter().collect(),
            archived_stale_ids: candidates.stale.into_iter().collect(),
            metadata,
        };
        write_artifact(&self.paths.maintenance_dir(), &now, &report.id, &report)?;

        if !dry_run {
            self.journal.append(
                Event::new(EventType::Maintenance)
                    .with_text(format!(
                        "Archived {} duplicate and {} stale items",
                        report.deduplicated_count, report.archived_stale_count
                    ))
                    .with_meta("report_id", report.id.clone())
                    .with_meta("deduplicated_count", report.deduplicated_count)
                    .with_meta("archived_stale_count", report.archived_stale_count)
                    .with_meta("verification_count", report.verification_count),
            )?;
        }

        metrics::counter!(MAINTENANCE_RUNS, "dry_run" => if dry_run { "true" } else { "false" })
            .increment(1);
        info!(
            report_id = %report.id,
            dry_run,
            duplicates = report.deduplicated_count,
            stale = report.archived_stale_count,
            verification = report.verification_count,
            "Maintenance completed"
        );
        Ok(report)
    }
}

/// Classifies active items.
#[must_use]
pub fn find_candidates(items: &[MemoryItem], now: DateTime<Utc>, stale_days: i64) -> Candidates {
    let mut groups: HashMap<String, Vec<&MemoryItem>> = HashMap::new();
    for item in items {
        groups.entry(dedup_key(item)).or_default().push(item);
    }

    let mut candidates = Candidates::default();
    for group in groups.values().filter(|g| g.len() > 1) {
        let keeper = group.iter().max_by(|a, b| {
            a.importance
                .cmp(&b.importance)
                .then_with(|| a.updated_at.cmp(&b.updated_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        let Some(keeper) = keeper else { continue };
        candidates.duplicates.extend(
            group
                .iter()
                .filter(|item| item.id != keeper.id)
                .map(|item| item.id.clone()),
        );
    }

    let stale_cutoff = now - Duration::days(stale_days.max(MIN_STALE_DAYS));
    let verification_cutoff = now - Duration::days(VERIFICATION_AGE_DAYS);
    for item in items {
        if item.importance <= 2
            && item.updated_at < stale_cutoff
            && !candidates.duplicates.contains(&item.id)
        {
            candidates.stale.insert(item.id.clone());
        }
        if item.importance >= 3
            && (item.confidence < VERIFICATION_CONFIDENCE || item.updated_at < verification_cutoff)
        {
            candidates.verification.insert(item.id.clone());
        }
    }
    candidates
}

/// Hash of the normalized `kind|title|content` triple.
#[must_use]
pub fn dedup_key(item: &MemoryItem) -> String {
    let content: String = item
        .content
        .trim()
        .to_lowercase()
        .chars()
        .take(DEDUP_CONTENT_CHARS)
        .collect();
    let key = format!("{}|{}|{}", item.kind, item.title, content)
        .trim()
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn item(id: &str, importance: i64, age_days: i64, now: DateTime<Utc>) -> MemoryItem {
        let mut item = MemoryItem::new("note", format!("title {id}"), format!("content {id}"))
            .with_id(id)
            .with_importance(importance)
            .with_confidence(0.9);
        item.updated_at = now - Duration::days(age_days);
        item
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_dedup_key_ignores_case_and_tail() {
        let a = MemoryItem::new("Note", "Tone", format!("{}AAA", "x".repeat(160)));
        let b = MemoryItem::new("note", "tone", format!("{}bbb", "X".repeat(160)));
        assert_eq!(dedup_key(&a), dedup_key(&b));
        assert_eq!(dedup_key(&a).len(), 64);
        let c = MemoryItem::new("note", "tone", "different");
        assert_ne!(dedup_key(&a), dedup_key(&c));
    }

    #[test]
    fn test_keeper_is_most_important_then_latest() {
        let now = now();
        let mut low = item("low", 2, 1, now);
        let mut high_old = item("high-old", 4, 10, now);
        let mut high_new = item("high-new", 4, 2, now);
        for it in [&mut low, &mut high_old, &mut high_new] {
            it.title = "same".to_string();
            it.content = "same".to_string();
        }
        let candidates = find_candidates(&[low, high_old, high_new], now, 45);
        let dups: Vec<&str> = candidates.duplicates.iter().map(String::as_str).collect();
        assert_eq!(dups, vec!["high-old", "low"]);
    }

    #[test_case(2, 50, 45, true ; "old and unimportant")]
    #[test_case(2, 10, 45, false ; "recent")]
    #[test_case(3, 400, 45, false ; "important")]
    #[test_case(1, 8, 1, true ; "threshold raised to seven days")]
    #[test_case(1, 6, 1, false ; "younger than minimum threshold")]
    fn test_stale(importance: i64, age_days: i64, stale_days: i64, expected: bool) {
        let now = now();
        let candidates = find_candidates(&[item("x", importance, age_days, now)], now, stale_days);
        assert_eq!(candidates.stale.contains("x"), expected);
    }

    #[test]
    fn test_verification() {
        let now = now();
        let old = item("old", 3, 31, now);
        let doubtful = item("doubtful", 5, 1, now).with_confidence(0.5);
        let fine = item("fine", 4, 1, now);
        let trivial = item("trivial", 2, 100, now).with_confidence(0.1);
        let candidates = find_candidates(&[old, doubtful, fine, trivial], now, 45);
        let ids: Vec<&str> = candidates.verification.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["doubtful", "old"]);
    }

    #[test]
    fn test_duplicates_are_not_also_stale() {
        let now = now();
        let mut a = item("a", 1, 100, now);
        let mut b = item("b", 1, 90, now);
        for it in [&mut a, &mut b] {
            it.title = "dup".to_string();
            it.content = "dup".to_string();
        }
        let candidates = find_candidates(&[a, b], now, 45);
        assert!(candidates.duplicates.contains("a"));
        assert!(!candidates.stale.contains("a"));
        assert!(candidates.stale.contains("b"));
    }
}
