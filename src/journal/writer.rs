//! Day-partitioned append writer.

use crate::models::Event;
use crate::observability::metrics::JOURNAL_WRITE_ERRORS;
use crate::{Error, Result};
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

/// File name of the partition holding events from `day`.
#[must_use]
pub fn partition_file_name(day: NaiveDate) -> String {
    format!("{}.jsonl", day.format("%Y-%m-%d"))
}

/// Opens a partition for append, creating it owner read/write only.
pub(crate) fn open_partition(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| Error::OperationFailed {
        operation: "open_partition".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

/// Serializes an event as one JSON line.
pub(crate) fn encode_line(event: &Event) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(event).map_err(|e| Error::storage("encode_event", e))?;
    line.push(b'\n');
    Ok(line)
}

/// Captures the first fatal error seen by the writer.
#[derive(Debug, Default)]
pub(crate) struct ErrorSlot(Mutex<Option<Error>>);

impl ErrorSlot {
    pub(crate) fn record(&self, err: Error) {
        metrics::counter!(JOURNAL_WRITE_ERRORS).increment(1);
        tracing::warn!(error = %err, "Journal write failed");
        if let Ok(mut slot) = self.0.lock() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    pub(crate) fn take(&self) -> Option<Error> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

struct OpenPartition {
    day: NaiveDate,
    file: File,
}

/// Single consumer owning the currently open day file.
pub(crate) struct PartitionWriter {
    events_dir: PathBuf,
    current: Option<OpenPartition>,
    errors: Arc<ErrorSlot>,
}

impl PartitionWriter {
    pub(crate) fn new(events_dir: PathBuf, errors: Arc<ErrorSlot>) -> Self {
        Self {
            events_dir,
            current: None,
            errors,
        }
    }

    /// Consumes events FIFO until every sender is gone, then flushes.
    pub(crate) fn run(mut self, rx: &Receiver<Event>) {
        while let Ok(event) = rx.recv() {
            if let Err(e) = self.write(&event) {
                self.errors.record(e);
            }
        }
        if let Err(e) = self.close_current() {
            self.errors.record(e);
        }
    }

    fn write(&mut self, event: &Event) -> Result<()> {
        let line = encode_line(event)?;
        let day = event.timestamp.date_naive();
        if self.current.as_ref().is_none_or(|p| p.day != day) {
            self.close_current()?;
            let path = self.events_dir.join(partition_file_name(day));
            self.current = Some(OpenPartition {
                day,
                file: open_partition(&path)?,
            });
        }
        let Some(partition) = self.current.as_mut() else {
            return Ok(());
        };
        partition
            .file
            .write_all(&line)
            .map_err(|e| Error::storage("append_event", e))
    }

    /// Flush, sync, close.
    fn close_current(&mut self) -> Result<()> {
        let Some(mut partition) = self.current.take() else {
            return Ok(());
        };
        partition
            .file
            .flush()
            .and_then(|()| partition.file.sync_all())
            .map_err(|e| Error::storage("sync_partition", e))
    }
}
