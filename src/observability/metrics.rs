//! Metric names and recording helpers.
//!
//! Only the `metrics` facade is used here; installing a recorder is up to
//! the host process.

use std::time::Instant;

/// Events accepted by a journal.
pub const JOURNAL_EVENTS_INGESTED: &str = "journal_events_ingested_total";
/// Events dropped on a full journal buffer.
pub const JOURNAL_EVENTS_DROPPED: &str = "journal_events_dropped_total";
/// Writer-side journal failures.
pub const JOURNAL_WRITE_ERRORS: &str = "journal_write_errors_total";
/// Item store operations by name and status.
pub const STORAGE_OPERATIONS: &str = "storage_operations_total";
/// Item store operation latency.
pub const STORAGE_DURATION_MS: &str = "storage_operation_duration_ms";
/// Distiller runs by mode.
pub const DISTILL_RUNS: &str = "distill_runs_total";
/// Recall searches by mode.
pub const RECALL_SEARCHES: &str = "recall_searches_total";
/// Maintenance passes by dry-run flag.
pub const MAINTENANCE_RUNS: &str = "maintenance_runs_total";

/// Records the outcome and latency of one storage operation.
pub fn record_storage<T>(operation: &'static str, start: Instant, result: &crate::Result<T>) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::counter!(
        STORAGE_OPERATIONS,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(STORAGE_DURATION_MS, "operation" => operation)
        .record(start.elapsed().as_secs_f64() * 1000.0);
}
