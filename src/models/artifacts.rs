//! Checkpoint records, maintenance reports and health snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Item counts and on-disk size of an agent's store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Database path (`:memory:` for in-memory stores).
    pub db_path: String,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
    /// All items.
    pub total_items: u64,
    /// Items with status `active`.
    pub active_items: u64,
    /// Items with status `forgotten`.
    pub forgotten_items: u64,
    /// Items with status `archived`.
    pub archived_items: u64,
}

/// Links a window of journal events to the items distilled from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Record id.
    pub id: String,
    /// Owning agent.
    pub agent_id: String,
    /// When the checkpoint was taken.
    pub created_at: DateTime<Utc>,
    /// Exclusive lower bound of the window; `None` for the first checkpoint.
    pub from_timestamp: Option<DateTime<Utc>>,
    /// Timestamp of the last event in the window.
    pub to_timestamp: DateTime<Utc>,
    /// Events in the window.
    pub event_count: usize,
    /// Items created.
    pub new_item_count: usize,
    /// Items updated.
    pub updated_item_count: usize,
    /// Human-readable summary.
    pub summary: String,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Report id.
    pub id: String,
    /// Owning agent.
    pub agent_id: String,
    /// When the pass ran.
    pub created_at: DateTime<Utc>,
    /// Duplicates found (archived unless dry run).
    pub deduplicated_count: usize,
    /// Stale items found (archived unless dry run).
    pub archived_stale_count: usize,
    /// Items flagged for verification.
    pub verification_count: usize,
    /// Whether the database was vacuumed.
    pub compacted: bool,
    /// Health before the pass.
    pub before: Health,
    /// Health after the pass.
    pub after: Health,
    /// Items flagged for verification, sorted.
    pub verification_item_ids: Vec<String>,
    /// Duplicate ids, sorted.
    pub archived_duplicate_ids: Vec<String>,
    /// Stale ids, sorted.
    pub archived_stale_ids: Vec<String>,
    /// Pass parameters and cutoffs.
    pub metadata: Map<String, Value>,
}
