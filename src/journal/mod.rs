//! Append-only per-agent event journal.
//!
//! Producers call [`Journal::ingest`], which never blocks: events go through
//! a bounded channel to a single writer thread that owns the open day file.
//! When the channel is full the event is dropped, a counter advances and the
//! caller gets [`Error::QueueFull`].
//!
//! Partitions live at `<root>/<agent>/memory/events/<YYYY-MM-DD>.jsonl`,
//! one JSON object per line, keyed by the UTC day of each event.

mod reader;
mod writer;

pub use reader::{EventIter, read_matching};
pub use writer::partition_file_name;

use crate::models::Event;
use crate::observability::metrics::{JOURNAL_EVENTS_DROPPED, JOURNAL_EVENTS_INGESTED};
use crate::services::path_manager::{AgentPaths, ensure_dir};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use writer::{ErrorSlot, PartitionWriter, encode_line, open_partition};

/// Ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JournalStats {
    /// Events dropped because the buffer was full.
    pub dropped_events: u64,
    /// Events accepted into the buffer.
    pub ingested_events: u64,
}

/// Handle to one agent's journal.
pub struct Journal {
    agent_id: String,
    events_dir: PathBuf,
    enabled: bool,
    sender: RwLock<Option<SyncSender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    errors: Arc<ErrorSlot>,
    dropped: AtomicU64,
    ingested: AtomicU64,
    closed: AtomicBool,
}

impl Journal {
    /// Opens the journal for `agent_id` under `root` and starts its writer.
    ///
    /// A disabled journal accepts every call and writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad agent id, or
    /// [`Error::OperationFailed`] if the events directory cannot be created
    /// or the writer thread cannot start.
    pub fn open(root: &Path, agent_id: &str, enabled: bool, buffer_size: usize) -> Result<Self> {
        let paths = AgentPaths::new(root, agent_id)?;
        let events_dir = paths.events_dir();
        let errors = Arc::new(ErrorSlot::default());

        let (sender, worker) = if enabled {
            ensure_dir(&events_dir)?;
            let (tx, rx) = mpsc::sync_channel::<Event>(buffer_size.max(1));
            let writer = PartitionWriter::new(events_dir.clone(), Arc::clone(&errors));
            let handle = std::thread::Builder::new()
                .name(format!("journal-{}", paths.agent_id()))
                .spawn(move || writer.run(&rx))
                .map_err(|e| Error::storage("spawn_journal_writer", e))?;
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        tracing::debug!(agent_id = paths.agent_id(), enabled, buffer_size, "Journal opened");

        Ok(Self {
            agent_id: paths.agent_id().to_string(),
            events_dir,
            enabled,
            sender: RwLock::new(sender),
            worker: Mutex::new(worker),
            errors,
            dropped: AtomicU64::new(0),
            ingested: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// The agent this journal belongs to.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The partition directory.
    #[must_use]
    pub fn events_dir(&self) -> &Path {
        &self.events_dir
    }

    /// Returns true unless the journal was opened disabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queues an event for writing without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] when the buffer is full (the event is
    /// dropped and counted) or [`Error::Closed`] after [`Journal::close`].
    pub fn ingest(&self, event: Event) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let event = event.normalized();
        let guard = self
            .sender
            .read()
            .map_err(|_| Error::Closed("journal".to_string()))?;
        let Some(sender) = guard.as_ref() else {
            return Err(Error::Closed("journal".to_string()));
        };
        match sender.try_send(event) {
            Ok(()) => {
                self.ingested.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(JOURNAL_EVENTS_INGESTED).increment(1);
                Ok(())
            },
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(JOURNAL_EVENTS_DROPPED).increment(1);
                Err(Error::QueueFull)
            },
            Err(TrySendError::Disconnected(_)) => Err(Error::Closed("journal".to_string())),
        }
    }

    /// Writes an event synchronously, bypassing the buffer.
    ///
    /// Used where emission order matters relative to the caller's own
    /// writes (decisions, checkpoints, maintenance).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close, or [`Error::OperationFailed`]
    /// if the partition cannot be written.
    pub fn append(&self, event: Event) -> Result<Event> {
        if !self.enabled {
            return Ok(event.normalized());
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("journal".to_string()));
        }
        append_to_dir(&self.events_dir, event)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> JournalStats {
        JournalStats {
            dropped_events: self.dropped.load(Ordering::Relaxed),
            ingested_events: self.ingested.load(Ordering::Relaxed),
        }
    }

    /// Reads up to `max` events after `since`, most recent kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the partitions cannot be listed.
    pub fn read_events_since(
        &self,
        since: Option<DateTime<Utc>>,
        max: usize,
    ) -> Result<Vec<Event>> {
        read_matching(&self.events_dir, since, max, |_| true)
    }

    /// Stops accepting events, waits for the writer to drain and flush.
    ///
    /// Returns the first writer error observed, if any. Closing twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns the writer's first fatal error.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Ok(mut sender) = self.sender.write() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = worker {
            if handle.join().is_err() {
                return Err(Error::storage("journal_writer", "writer thread panicked"));
            }
        }
        tracing::debug!(agent_id = %self.agent_id, stats = ?self.stats(), "Journal closed");
        self.errors.take().map_or(Ok(()), Err)
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(agent_id = %self.agent_id, error = %e, "Journal closed with error");
        }
    }
}

/// Synchronously appends one event to an agent's journal.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a bad agent id, or
/// [`Error::OperationFailed`] on I/O failure.
pub fn append_event(root: &Path, agent_id: &str, event: Event) -> Result<Event> {
    let paths = AgentPaths::new(root, agent_id)?;
    append_to_dir(&paths.events_dir(), event)
}

/// Reads up to `max` events after `since` from an agent's journal.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a bad agent id, or
/// [`Error::OperationFailed`] if the partitions cannot be listed.
pub fn read_events_since(
    root: &Path,
    agent_id: &str,
    since: Option<DateTime<Utc>>,
    max: usize,
) -> Result<Vec<Event>> {
    let paths = AgentPaths::new(root, agent_id)?;
    read_matching(&paths.events_dir(), since, max, |_| true)
}

fn append_to_dir(events_dir: &Path, event: Event) -> Result<Event> {
    let event = event.normalized();
    ensure_dir(events_dir)?;
    let path = events_dir.join(partition_file_name(event.timestamp.date_naive()));
    let line = encode_line(&event)?;
    let mut file = open_partition(&path)?;
    file.write_all(&line)
        .and_then(|()| file.flush())
        .map_err(|e| Error::storage("append_event", e))?;
    Ok(event)
}
