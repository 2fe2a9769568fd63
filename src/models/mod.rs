//! Data models for agentmem.
//!
//! Events, memory items, search parameters and the artifacts written by
//! checkpoints and maintenance passes.

mod artifacts;
mod event;
mod item;
mod search;

pub use artifacts::{CheckpointRecord, Health, MaintenanceReport};
pub use event::{Event, EventType};
pub use item::{
    DEFAULT_CONFIDENCE, DEFAULT_KIND, ItemStatus, MAX_IMPORTANCE, MIN_IMPORTANCE, MemoryItem,
};
pub use search::{SearchMode, SearchParams, SearchResults};

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats an instant for storage.
///
/// Always nanosecond precision with a `Z` suffix, so that lexicographic
/// order of the stored strings equals chronological order.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a stored RFC 3339 instant into UTC.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if the value is not RFC 3339.
pub fn parse_timestamp(value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::InvalidInput(format!("invalid timestamp '{value}': {e}")))
}

/// Returns true for the zero instant (the serde default).
#[must_use]
pub fn is_zero_timestamp(ts: &DateTime<Utc>) -> bool {
    *ts == DateTime::<Utc>::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_lexicographically_ordered() {
        let a = Utc.with_ymd_and_hms(2026, 2, 18, 23, 59, 59).unwrap();
        let b = a + chrono::Duration::nanoseconds(1);
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert_eq!(format_timestamp(&a), "2026-02-18T23:59:59.000000000Z");
    }

    #[test]
    fn test_parse_normalizes_offset() {
        let ts = parse_timestamp("2026-02-19T01:00:01+01:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 1).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
