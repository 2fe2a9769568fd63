//! Checkpoint service.
//!
//! Distills the journal events written since the previous checkpoint into
//! items, records the window it consumed, and logs a `checkpoint` event.

use super::path_manager::AgentPaths;
use super::sync_embedding;
use crate::cancel::CancelToken;
use crate::distill::{DistillMode, Distiller, KnownItem};
use crate::embedding::Embedder;
use crate::journal::{Journal, read_matching};
use crate::models::{CheckpointRecord, Event, EventType, ItemStatus, MemoryItem};
use crate::storage::ItemStore;
use crate::storage::artifacts::{latest_artifact, write_artifact};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Events read per checkpoint when no limit is given.
pub const DEFAULT_MAX_EVENTS: usize = crate::config::DEFAULT_MAX_EVENTS;

/// Active items shown to the model as update targets.
pub const KNOWN_ITEMS_CONTEXT: usize = 50;

/// Result document of one checkpoint call.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointOutcome {
    /// Whether a record was written.
    pub checkpoint_created: bool,
    /// Why no record was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Exclusive lower bound of the window.
    pub from_timestamp: Option<DateTime<Utc>>,
    /// The written record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointRecord>,
    /// How the proposal was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DistillMode>,
    /// Why the model path was abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Items created.
    pub new_items: Vec<MemoryItem>,
    /// Items updated.
    pub updated_items: Vec<MemoryItem>,
}

impl CheckpointOutcome {
    fn skipped(reason: &str, from_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            checkpoint_created: false,
            reason: Some(reason.to_string()),
            from_timestamp,
            checkpoint: None,
            mode: None,
            fallback_reason: None,
            new_items: Vec::new(),
            updated_items: Vec::new(),
        }
    }
}

/// Service that turns journal windows into items.
pub struct CheckpointService {
    paths: AgentPaths,
    store: Arc<ItemStore>,
    journal: Arc<Journal>,
    distiller: Distiller,
    embedder: Option<Arc<dyn Embedder>>,
}

impl CheckpointService {
    /// Creates a checkpoint service for one agent.
    #[must_use]
    pub fn new(
        paths: AgentPaths,
        store: Arc<ItemStore>,
        journal: Arc<Journal>,
        distiller: Distiller,
    ) -> Self {
        Self {
            paths,
            store,
            journal,
            distiller,
            embedder: None,
        }
    }

    /// Stores embeddings for new and updated items.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// The most recent checkpoint record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the directory cannot be listed.
    pub fn latest(&self) -> Result<Option<CheckpointRecord>> {
        latest_artifact(&self.paths.checkpoints_dir())
    }

    /// Runs one checkpoint over at most `max_events` new events.
    ///
    /// `max_events` 0 means [`DEFAULT_MAX_EVENTS`]. Bookkeeping events
    /// (`checkpoint`, `maintenance`) never enter the window. Items are
    /// written one by one: a failing write aborts the run and earlier items
    /// stay stored. Embedding failures are logged and ignored.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Cancelled`] if `cancel` fires
    /// - [`crate::Error::OperationFailed`] on storage or journal failure
    #[instrument(skip(self, cancel), fields(operation = "checkpoint", agent_id = %self.paths.agent_id()))]
    pub fn run(&self, max_events: usize, cancel: &CancelToken) -> Result<CheckpointOutcome> {
        cancel.check("checkpoint")?;
        let max_events = if max_events == 0 {
            DEFAULT_MAX_EVENTS
        } else {
            max_events
        };

        let since = self.latest()?.map(|record| record.to_timestamp);
        let events = read_matching(&self.paths.events_dir(), since, max_events, |e| {
            !e.event_type.is_bookkeeping()
        })?;
        // Arrival order need not be timestamp order; the window ends at the newest.
        let Some(to_timestamp) = events.iter().map(|e| e.timestamp).max() else {
            debug!("No new events since last checkpoint");
            return Ok(CheckpointOutcome::skipped("no new events", since));
        };

        let known: Vec<KnownItem> = self
            .store
            .list(ItemStatus::Active, KNOWN_ITEMS_CONTEXT, cancel)?
            .iter()
            .map(KnownItem::from)
            .collect();
        let distillation = self.distiller.distill(&events, &known, cancel)?;

        let mut new_items = Vec::with_capacity(distillation.proposal.new_items.len());
        for proposed in distillation.proposal.new_items {
            cancel.check("checkpoint")?;
            let saved = self.store.upsert(proposed.into_item(), cancel)?;
            self.sync(&saved, cancel);
            new_items.push(saved);
        }

        let mut updated_items = Vec::new();
        for update in distillation.proposal.updates {
            cancel.check("checkpoint")?;
            let Some(mut item) = self.store.get(update.id.trim(), cancel)? else {
                debug!(memory.id = %update.id, "Skipping update for unknown item");
                continue;
            };
            item.content = update.new_content;
            item.confidence = update.confidence;
            let saved = self.store.update(item, cancel)?;
            self.sync(&saved, cancel);
            updated_items.push(saved);
        }

        let created_at = Utc::now();
        let record = CheckpointRecord {
            id: uuid::Uuid::now_v7().to_string(),
            agent_id: self.paths.agent_id().to_string(),
            created_at,
            from_timestamp: since,
            to_timestamp,
            event_count: events.len(),
            new_item_count: new_items.len(),
            updated_item_count: updated_items.len(),
            summary: format!(
                "{} events distilled into {} new and {} updated items ({})",
                events.len(),
                new_items.len(),
                updated_items.len(),
                distillation.mode
            ),
        };
        write_artifact(&self.paths.checkpoints_dir(), &created_at, &record.id, &record)?;

        self.journal.append(
            Event::new(EventType::Checkpoint)
                .with_text(record.summary.clone())
                .with_meta("checkpoint_id", record.id.clone())
                .with_meta("event_count", record.event_count)
                .with_meta("new_item_count", record.new_item_count)
                .with_meta("updated_item_count", record.updated_item_count)
                .with_meta("mode", distillation.mode.as_str()),
        )?;

        info!(
            checkpoint_id = %record.id,
            event_count = record.event_count,
            new_item_count = record.new_item_count,
            updated_item_count = record.updated_item_count,
            mode = distillation.mode.as_str(),
            "Checkpoint created"
        );

        Ok(CheckpointOutcome {
            checkpoint_created: true,
            reason: None,
            from_timestamp: since,
            checkpoint: Some(record),
            mode: Some(distillation.mode),
            fallback_reason: distillation.fallback_reason,
            new_items,
            updated_items,
        })
    }

    fn sync(&self, item: &MemoryItem, cancel: &CancelToken) {
        if let Some(embedder) = &self.embedder {
            sync_embedding(&self.store, embedder.as_ref(), item, cancel);
        }
    }
}
