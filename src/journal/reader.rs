//! Lazy partition reader.

use crate::models::Event;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Forward-only iterator over an agent's events.
///
/// Opens one partition at a time and reads it line by line. Partitions dated
/// before `since` are skipped without being opened; events at or before
/// `since` are filtered out. Undecodable lines are logged and skipped.
pub struct EventIter {
    partitions: VecDeque<PathBuf>,
    current: Option<Lines<BufReader<File>>>,
    since: Option<DateTime<Utc>>,
}

impl EventIter {
    /// Lists the partitions in `events_dir` that may hold events after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the directory exists but cannot
    /// be listed.
    pub fn open(events_dir: &Path, since: Option<DateTime<Utc>>) -> Result<Self> {
        let mut partitions = Vec::new();
        if events_dir.is_dir() {
            let entries = std::fs::read_dir(events_dir).map_err(|e| Error::OperationFailed {
                operation: "list_partitions".to_string(),
                cause: format!("{}: {e}", events_dir.display()),
            })?;
            let min_day = since.map(|s| s.date_naive());
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(day) = partition_day(&path) else {
                    continue;
                };
                if min_day.is_none_or(|min| day >= min) {
                    partitions.push((day, path));
                }
            }
        }
        partitions.sort_by_key(|(day, _)| *day);

        Ok(Self {
            partitions: partitions.into_iter().map(|(_, p)| p).collect(),
            current: None,
            since,
        })
    }

    fn advance_partition(&mut self) -> bool {
        while let Some(path) = self.partitions.pop_front() {
            match File::open(&path) {
                Ok(file) => {
                    self.current = Some(BufReader::new(file).lines());
                    return true;
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable partition");
                },
            }
        }
        false
    }
}

impl Iterator for EventIter {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            let Some(lines) = self.current.as_mut() else {
                if self.advance_partition() {
                    continue;
                }
                return None;
            };
            match lines.next() {
                None => self.current = None,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Stopping partition read on I/O error");
                    self.current = None;
                },
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Event>(&line) {
                        Ok(event) if self.since.is_none_or(|s| event.timestamp > s) => {
                            return Some(event);
                        },
                        Ok(_) => {},
                        Err(e) => tracing::warn!(error = %e, "Skipping malformed journal line"),
                    }
                },
            }
        }
    }
}

/// Reads at most `max` events after `since` that satisfy `keep`.
///
/// When more match, the most recent `max` are kept. Events come back in
/// arrival order: partitions by day, lines in file order.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the partition directory cannot be
/// listed.
pub fn read_matching(
    events_dir: &Path,
    since: Option<DateTime<Utc>>,
    max: usize,
    keep: impl Fn(&Event) -> bool,
) -> Result<Vec<Event>> {
    if max == 0 {
        return Ok(Vec::new());
    }
    let mut window: VecDeque<Event> = VecDeque::with_capacity(max.min(1024));
    for event in EventIter::open(events_dir, since)?.filter(|e| keep(e)) {
        if window.len() == max {
            window.pop_front();
        }
        window.push_back(event);
    }
    Ok(window.into())
}

fn partition_day(path: &Path) -> Option<NaiveDate> {
    if path.extension()? != "jsonl" {
        return None;
    }
    NaiveDate::parse_from_str(path.file_stem()?.to_str()?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lines(dir: &Path, name: &str, lines: &[String]) {
        let mut file = File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn event_line(text: &str, ts: DateTime<Utc>) -> String {
        serde_json::to_string(
            &Event::new(EventType::UserMessage)
                .with_text(text)
                .with_timestamp(ts),
        )
        .unwrap()
    }

    #[test]
    fn test_skips_old_partitions_and_bad_lines() {
        let dir = TempDir::new().unwrap();
        let d1 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap();
        write_lines(dir.path(), "2026-01-01.jsonl", &[event_line("old", d1)]);
        write_lines(
            dir.path(),
            "2026-01-02.jsonl",
            &[
                "{broken".to_string(),
                event_line("new", d2),
                event_line("newer", d2 + chrono::Duration::seconds(1)),
            ],
        );
        write_lines(dir.path(), "notes.txt", &["ignored".to_string()]);

        let texts: Vec<String> = EventIter::open(dir.path(), Some(d2))
            .unwrap()
            .filter_map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["newer".to_string()]);
    }

    #[test]
    fn test_read_matching_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let lines: Vec<String> = (0..10)
            .map(|i| event_line(&format!("e{i}"), base + chrono::Duration::seconds(i)))
            .collect();
        write_lines(dir.path(), "2026-03-01.jsonl", &lines);

        let events = read_matching(dir.path(), None, 3, |_| true).unwrap();
        let texts: Vec<_> = events.into_iter().filter_map(|e| e.text).collect();
        assert_eq!(texts, vec!["e7", "e8", "e9"]);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let events = read_matching(&dir.path().join("nope"), None, 10, |_| true).unwrap();
        assert!(events.is_empty());
    }
}
