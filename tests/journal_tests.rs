//! Journal integration tests.
//!
//! Covers day-partition rollover, drop-on-overflow accounting, arrival
//! order and handle lifecycle.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use agentmem::journal::{self, Journal};
use agentmem::{Error, Event, EventType};
use chrono::{TimeZone, Utc};
use std::fs;
use tempfile::TempDir;

fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_rollover_writes_one_file_per_day() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", true, 8).unwrap();

    journal
        .ingest(
            Event::new(EventType::UserMessage)
                .with_text("u1")
                .with_timestamp(Utc.with_ymd_and_hms(2026, 2, 18, 23, 59, 59).unwrap()),
        )
        .unwrap();
    journal
        .ingest(
            Event::new(EventType::AssistantOutput)
                .with_text("a1")
                .with_timestamp(Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 1).unwrap()),
        )
        .unwrap();
    journal.close().unwrap();

    let events_dir = dir.path().join("a").join("memory").join("events");
    let first = read_lines(&events_dir.join("2026-02-18.jsonl"));
    let second = read_lines(&events_dir.join("2026-02-19.jsonl"));

    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["type"], "user_message");
    assert_eq!(first[0]["text"], "u1");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["type"], "assistant_output");
}

#[cfg(unix)]
#[test]
fn test_partition_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", true, 8).unwrap();
    let event = journal
        .append(Event::new(EventType::ToolCall).with_text("ls"))
        .unwrap();
    journal.close().unwrap();

    let path = journal
        .events_dir()
        .join(journal::partition_file_name(event.timestamp.date_naive()));
    let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[test]
fn test_overflow_drops_and_counts() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", true, 1).unwrap();

    let mut rejected = 0_u64;
    for i in 0..5000 {
        match journal.ingest(Event::new(EventType::ToolCall).with_text(format!("call {i}"))) {
            Ok(()) => {},
            Err(Error::QueueFull) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    journal.close().unwrap();

    let stats = journal.stats();
    assert!(stats.dropped_events >= 1);
    assert_eq!(stats.dropped_events, rejected);
    assert_eq!(stats.ingested_events + stats.dropped_events, 5000);

    let written = journal.read_events_since(None, 10_000).unwrap();
    assert_eq!(written.len() as u64, 5000 - stats.dropped_events);
}

#[test]
fn test_arrival_order_is_preserved() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", true, 64).unwrap();
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    for i in 0..20 {
        journal
            .ingest(
                Event::new(EventType::UserMessage)
                    .with_text(format!("m{i}"))
                    .with_timestamp(base + chrono::Duration::seconds(i)),
            )
            .unwrap();
    }
    journal.close().unwrap();

    let texts: Vec<String> = journal
        .read_events_since(None, 100)
        .unwrap()
        .into_iter()
        .filter_map(|e| e.text)
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_out_of_order_timestamps_keep_arrival_order() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", true, 8).unwrap();
    for (text, second) in [("first", 5), ("second", 1), ("third", 3)] {
        journal
            .ingest(
                Event::new(EventType::UserMessage)
                    .with_text(text)
                    .with_timestamp(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, second).unwrap()),
            )
            .unwrap();
    }
    journal.close().unwrap();

    let texts: Vec<String> = journal
        .read_events_since(None, 10)
        .unwrap()
        .into_iter()
        .filter_map(|e| e.text)
        .collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[test]
fn test_read_since_is_exclusive_and_keeps_most_recent() {
    let dir = TempDir::new().unwrap();
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    for i in 0..10 {
        journal::append_event(
            dir.path(),
            "a",
            Event::new(EventType::ToolResult)
                .with_text(format!("r{i}"))
                .with_timestamp(base + chrono::Duration::minutes(i)),
        )
        .unwrap();
    }

    let since = base + chrono::Duration::minutes(4);
    let after = journal::read_events_since(dir.path(), "a", Some(since), 100).unwrap();
    assert_eq!(after.len(), 5);
    assert_eq!(after[0].text.as_deref(), Some("r5"));

    let recent = journal::read_events_since(dir.path(), "a", None, 3).unwrap();
    let texts: Vec<&str> = recent.iter().filter_map(|e| e.text.as_deref()).collect();
    assert_eq!(texts, vec!["r7", "r8", "r9"]);
}

#[test]
fn test_malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let event = journal::append_event(
        dir.path(),
        "a",
        Event::new(EventType::Error).with_text("boom"),
    )
    .unwrap();
    let path = dir
        .path()
        .join("a/memory/events")
        .join(journal::partition_file_name(event.timestamp.date_naive()));
    let mut body = fs::read_to_string(&path).unwrap();
    body.push_str("{not json\n");
    fs::write(&path, body).unwrap();

    let events = journal::read_events_since(dir.path(), "a", None, 10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, event.id);
}

#[test]
fn test_closed_journal_rejects_ingest() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", true, 4).unwrap();
    journal.close().unwrap();
    journal.close().unwrap();

    let err = journal.ingest(Event::new(EventType::UserMessage)).unwrap_err();
    assert!(matches!(err, Error::Closed(_)));
    let err = journal.append(Event::new(EventType::UserMessage)).unwrap_err();
    assert!(matches!(err, Error::Closed(_)));
}

#[test]
fn test_disabled_journal_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::open(dir.path(), "a", false, 4).unwrap();
    journal
        .ingest(Event::new(EventType::UserMessage).with_text("ignored"))
        .unwrap();
    journal.close().unwrap();
    assert!(!journal.events_dir().exists());
    assert_eq!(journal.stats().ingested_events, 0);
}

#[test]
fn test_invalid_agent_id() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Journal::open(dir.path(), "../escape", true, 4),
        Err(Error::InvalidInput(_))
    ));
}
