//! The single entry point tool handlers bind to.
//!
//! A [`MemoryFacade`] owns one agent's item store and journal, plus the
//! services built over them from the current [`MemoryConfig`] snapshot.
//! The snapshot is swapped only between operations
//! ([`MemoryFacade::reload_config`]); an operation in flight keeps the
//! snapshot it started with.
//!
//! # Example
//!
//! ```rust,ignore
//! use agentmem::facade::{AllowAll, MemoryFacade};
//! use serde_json::json;
//!
//! let facade = MemoryFacade::open(config, "planner")?;
//! let result = facade.invoke(
//!     "memory.search",
//!     json!({"query": "deploy"}),
//!     Some(&AllowAll),
//!     &CancelToken::new(),
//! )?;
//! ```

mod args;
mod tools;

pub use args::{
    CheckpointArgs, DEFAULT_DECISION_CONFIDENCE, DEFAULT_DECISION_IMPORTANCE,
    DEFAULT_WRITE_CONFIDENCE, DEFAULT_WRITE_IMPORTANCE, DecisionArgs, ForgetArgs, HealthArgs,
    MAX_CONTENT_LENGTH, MAX_QUERY_LENGTH, MaintenanceArgs, SearchArgs, UpdateArgs, WriteArgs,
};
pub use tools::{AllowAll, ReadOnly, ToolName, ToolPolicy};

use crate::cancel::CancelToken;
use crate::config::MemoryConfig;
use crate::distill::Distiller;
use crate::embedding::{Embedder, HttpEmbedder};
use crate::journal::{Journal, JournalStats};
use crate::llm::{LlmProvider, OpenAiCompatClient};
use crate::models::{
    CheckpointRecord, Event, EventType, Health, ItemStatus, MaintenanceReport, MemoryItem,
    SearchParams, SearchResults,
};
use crate::services::{
    AgentPaths, CheckpointOutcome, CheckpointService, MaintenanceService, RecallService,
    sync_embedding,
};
use crate::storage::ItemStore;
use crate::{Error, Result};
use args::{decode, parse_status, require, validate_input_length};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, instrument, warn};

/// Remote clients used by a facade.
#[derive(Clone, Default)]
pub struct Clients {
    /// Embedder for hybrid recall and embedding sync.
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Chat model for distillation.
    pub llm: Option<Arc<dyn LlmProvider>>,
}

impl Clients {
    /// Builds HTTP clients for the usable endpoints in `config`.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        let embedder = config
            .embeddings
            .is_usable()
            .then(|| Arc::new(HttpEmbedder::from_endpoint(&config.embeddings)) as Arc<dyn Embedder>);
        let llm = config.distiller.is_usable().then(|| {
            Arc::new(OpenAiCompatClient::from_endpoint(&config.distiller)) as Arc<dyn LlmProvider>
        });
        Self { embedder, llm }
    }
}

/// Outcome of `update`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// Whether the item existed.
    pub found: bool,
    /// The saved item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<MemoryItem>,
}

/// Outcome of `forget`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ForgetOutcome {
    /// Whether an active item was forgotten.
    pub forgotten: bool,
}

struct Snapshot {
    config: MemoryConfig,
    embedder: Option<Arc<dyn Embedder>>,
    recall: RecallService,
    checkpoint: CheckpointService,
    maintenance: MaintenanceService,
}

/// Memory operations for one agent.
pub struct MemoryFacade {
    paths: AgentPaths,
    store: Arc<ItemStore>,
    journal: Arc<Journal>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl MemoryFacade {
    /// Opens the facade for `agent_id` with clients built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad agent id, or
    /// [`Error::OperationFailed`] if the store or journal cannot be opened.
    pub fn open(config: MemoryConfig, agent_id: &str) -> Result<Self> {
        let clients = Clients::from_config(&config);
        Self::open_with_clients(config, agent_id, clients)
    }

    /// Opens the facade with caller-supplied clients.
    ///
    /// The embedder is only used when `config.embeddings.enabled` is set.
    ///
    /// # Errors
    ///
    /// As [`MemoryFacade::open`].
    pub fn open_with_clients(config: MemoryConfig, agent_id: &str, clients: Clients) -> Result<Self> {
        let paths = AgentPaths::new(&config.root_dir, agent_id)?;
        paths.ensure_dirs()?;
        let store = Arc::new(ItemStore::open(paths.db_path(), paths.agent_id())?);
        let journal = Arc::new(Journal::open(
            &config.root_dir,
            paths.agent_id(),
            config.journal.enabled,
            config.journal.buffer_size,
        )?);
        let snapshot = build_snapshot(&paths, &store, &journal, config, clients);

        info!(
            agent_id = paths.agent_id(),
            hybrid = snapshot.recall.has_embedder(),
            "Memory facade opened"
        );
        Ok(Self {
            paths,
            store,
            journal,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The agent this facade serves.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        self.paths.agent_id()
    }

    /// The agent's directory layout.
    #[must_use]
    pub const fn paths(&self) -> &AgentPaths {
        &self.paths
    }

    /// A copy of the current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> MemoryConfig {
        self.snapshot().config.clone()
    }

    /// Swaps in a new configuration with clients built from it.
    ///
    /// Root directory and journal settings only apply to facades opened
    /// after the change.
    pub fn reload_config(&self, config: MemoryConfig) {
        let clients = Clients::from_config(&config);
        self.reload_config_with_clients(config, clients);
    }

    /// Swaps in a new configuration with caller-supplied clients.
    pub fn reload_config_with_clients(&self, config: MemoryConfig, clients: Clients) {
        let current = self.snapshot();
        if config.root_dir != current.config.root_dir || config.journal != current.config.journal {
            warn!(agent_id = self.agent_id(), "Root and journal changes apply on reopen");
        }
        let next = build_snapshot(&self.paths, &self.store, &self.journal, config, clients);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        info!(agent_id = self.agent_id(), "Configuration reloaded");
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Searches the agent's items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an oversized query or unknown
    /// status; otherwise as [`RecallService::search`].
    pub fn search(&self, args: SearchArgs, cancel: &CancelToken) -> Result<SearchResults> {
        let query = args.query.unwrap_or_default();
        validate_input_length(&query, "query", MAX_QUERY_LENGTH)?;
        let status = args
            .status
            .as_deref()
            .map_or(Ok(ItemStatus::Active), parse_status)?;
        let params = SearchParams {
            query,
            limit: args.limit.unwrap_or(0),
            min_importance: args.min_importance.unwrap_or(0),
            status,
        };
        self.snapshot().recall.search(&params, cancel)
    }

    /// Stores a new item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank or oversized field;
    /// otherwise as [`ItemStore::upsert`].
    #[instrument(skip(self, args, cancel), fields(operation = "write", agent_id = %self.agent_id()))]
    pub fn write(&self, args: WriteArgs, cancel: &CancelToken) -> Result<MemoryItem> {
        let kind = require(&args.kind, "kind")?;
        let title = require(&args.title, "title")?;
        let content = require(&args.content, "content")?;
        validate_input_length(content, "content", MAX_CONTENT_LENGTH)?;
        let status = args
            .status
            .as_deref()
            .map_or(Ok(ItemStatus::Active), parse_status)?;

        let mut item = MemoryItem::new(kind, title, content)
            .with_importance(args.importance.unwrap_or(DEFAULT_WRITE_IMPORTANCE))
            .with_confidence(args.confidence.unwrap_or(DEFAULT_WRITE_CONFIDENCE));
        item.status = status;
        let saved = self.store.upsert(item, cancel)?;
        self.sync(&saved, cancel);
        Ok(saved)
    }

    /// Changes the given fields of an existing item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank id, oversized content or
    /// unknown status; otherwise as [`ItemStore::update`]. An unknown id is
    /// reported as `found: false`, not as an error.
    #[instrument(skip(self, args, cancel), fields(operation = "update", agent_id = %self.agent_id(), memory.id = %args.id))]
    pub fn update(&self, args: UpdateArgs, cancel: &CancelToken) -> Result<UpdateOutcome> {
        let id = require(&args.id, "id")?;
        if let Some(content) = &args.content {
            validate_input_length(content, "content", MAX_CONTENT_LENGTH)?;
        }
        let status = args.status.as_deref().map(parse_status).transpose()?;

        let Some(mut item) = self.store.get(id, cancel)? else {
            return Ok(UpdateOutcome {
                found: false,
                item: None,
            });
        };
        if let Some(kind) = args.kind {
            item.kind = kind;
        }
        if let Some(title) = args.title {
            item.title = title;
        }
        if let Some(content) = args.content {
            item.content = content;
        }
        if let Some(importance) = args.importance {
            item.importance = importance;
        }
        if let Some(confidence) = args.confidence {
            item.confidence = confidence;
        }
        if let Some(status) = status {
            item.status = status;
        }

        match self.store.update(item, cancel) {
            Ok(saved) => {
                self.sync(&saved, cancel);
                Ok(UpdateOutcome {
                    found: true,
                    item: Some(saved),
                })
            },
            Err(Error::NotFound(_)) => Ok(UpdateOutcome {
                found: false,
                item: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Marks an active item forgotten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank id; otherwise as
    /// [`ItemStore::forget`].
    pub fn forget(&self, args: ForgetArgs, cancel: &CancelToken) -> Result<ForgetOutcome> {
        let id = require(&args.id, "id")?;
        let forgotten = self.store.forget(id, cancel)?;
        Ok(ForgetOutcome { forgotten })
    }

    /// Item counts and database size.
    ///
    /// # Errors
    ///
    /// As [`ItemStore::health`].
    pub fn health(&self, cancel: &CancelToken) -> Result<Health> {
        self.store.health(cancel)
    }

    /// Stores a decision and logs a `decision_log` event for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank or oversized field;
    /// otherwise as [`ItemStore::upsert`] and [`Journal::append`].
    #[instrument(skip(self, args, cancel), fields(operation = "decision_log", agent_id = %self.agent_id()))]
    pub fn decision_log(&self, args: DecisionArgs, cancel: &CancelToken) -> Result<MemoryItem> {
        let title = require(&args.title, "title")?;
        let content = require(&args.content, "content")?;
        validate_input_length(content, "content", MAX_CONTENT_LENGTH)?;

        let item = MemoryItem::new("decision", title, content)
            .with_importance(args.importance.unwrap_or(DEFAULT_DECISION_IMPORTANCE))
            .with_confidence(args.confidence.unwrap_or(DEFAULT_DECISION_CONFIDENCE));
        let saved = self.store.upsert(item, cancel)?;
        self.sync(&saved, cancel);

        let mut event = Event::new(EventType::DecisionLog).with_text(saved.content.clone());
        event.metadata = args.metadata;
        let event = event
            .with_meta("title", saved.title.clone())
            .with_meta("item_id", saved.id.clone());
        self.journal.append(event)?;
        Ok(saved)
    }

    /// Distills new journal events into items.
    ///
    /// # Errors
    ///
    /// As [`CheckpointService::run`].
    pub fn checkpoint(&self, args: CheckpointArgs, cancel: &CancelToken) -> Result<CheckpointOutcome> {
        let snapshot = self.snapshot();
        let max_events = args
            .max_events
            .unwrap_or(snapshot.config.checkpoint_max_events);
        snapshot.checkpoint.run(max_events, cancel)
    }

    /// Archives duplicates and stale items, then compacts.
    ///
    /// # Errors
    ///
    /// As [`MaintenanceService::run`].
    pub fn maintenance(&self, args: MaintenanceArgs, cancel: &CancelToken) -> Result<MaintenanceReport> {
        let snapshot = self.snapshot();
        let stale_days = args
            .stale_days
            .unwrap_or(snapshot.config.maintenance_stale_days);
        snapshot
            .maintenance
            .run(stale_days, args.dry_run.unwrap_or(false), cancel)
    }

    /// Queues an event without blocking.
    ///
    /// # Errors
    ///
    /// As [`Journal::ingest`].
    pub fn ingest(&self, event: Event) -> Result<()> {
        self.journal.ingest(event)
    }

    /// Journal counters.
    #[must_use]
    pub fn journal_stats(&self) -> JournalStats {
        self.journal.stats()
    }

    /// Reads up to `max` journal events after `since`.
    ///
    /// # Errors
    ///
    /// As [`Journal::read_events_since`].
    pub fn events_since(&self, since: Option<DateTime<Utc>>, max: usize) -> Result<Vec<Event>> {
        self.journal.read_events_since(since, max)
    }

    /// The most recent checkpoint record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the directory cannot be listed.
    pub fn latest_checkpoint(&self) -> Result<Option<CheckpointRecord>> {
        self.snapshot().checkpoint.latest()
    }

    /// The most recent maintenance report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the directory cannot be listed.
    pub fn latest_maintenance_report(&self) -> Result<Option<MaintenanceReport>> {
        self.snapshot().maintenance.latest()
    }

    /// Flushes and stops the journal writer.
    ///
    /// # Errors
    ///
    /// As [`Journal::close`].
    pub fn close(&self) -> Result<()> {
        self.journal.close()
    }

    /// Dispatches a named tool call.
    ///
    /// `tool` may carry the `memory.` prefix. A missing policy is rejected
    /// with `policy_required` before the tool is resolved against it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an unknown tool, bad arguments or a
    ///   missing policy
    /// - [`Error::PolicyDenied`] if the policy refuses the tool
    /// - any error of the dispatched operation
    #[instrument(skip(self, arguments, policy, cancel), fields(agent_id = %self.agent_id()))]
    pub fn invoke(
        &self,
        tool: &str,
        arguments: Value,
        policy: Option<&dyn ToolPolicy>,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let name = ToolName::parse(tool)?;
        let Some(policy) = policy else {
            return Err(Error::InvalidInput("policy_required".to_string()));
        };
        if !policy.allows(self.agent_id(), name) {
            return Err(Error::PolicyDenied(format!(
                "tool '{name}' is not permitted for agent '{}'",
                self.agent_id()
            )));
        }

        let tool = name.as_str();
        match name {
            ToolName::Search => encode(&self.search(decode(tool, arguments)?, cancel)?),
            ToolName::Write => encode(&self.write(decode(tool, arguments)?, cancel)?),
            ToolName::Update => encode(&self.update(decode(tool, arguments)?, cancel)?),
            ToolName::Forget => encode(&self.forget(decode(tool, arguments)?, cancel)?),
            ToolName::Health => {
                let HealthArgs {} = decode(tool, arguments)?;
                encode(&self.health(cancel)?)
            },
            ToolName::DecisionLog => encode(&self.decision_log(decode(tool, arguments)?, cancel)?),
            ToolName::Checkpoint => encode(&self.checkpoint(decode(tool, arguments)?, cancel)?),
            ToolName::Maintenance => encode(&self.maintenance(decode(tool, arguments)?, cancel)?),
        }
    }

    fn sync(&self, item: &MemoryItem, cancel: &CancelToken) {
        if let Some(embedder) = &self.snapshot().embedder {
            sync_embedding(&self.store, embedder.as_ref(), item, cancel);
        }
    }
}

fn build_snapshot(
    paths: &AgentPaths,
    store: &Arc<ItemStore>,
    journal: &Arc<Journal>,
    config: MemoryConfig,
    clients: Clients,
) -> Snapshot {
    let embedder = clients.embedder.filter(|_| config.embeddings.enabled);
    let llm = clients.llm.filter(|_| config.distiller.enabled);

    let mut recall = RecallService::new(Arc::clone(store));
    let mut checkpoint = CheckpointService::new(
        paths.clone(),
        Arc::clone(store),
        Arc::clone(journal),
        Distiller::new(llm),
    );
    if let Some(embedder) = &embedder {
        recall = recall.with_embedder(Arc::clone(embedder));
        checkpoint = checkpoint.with_embedder(Arc::clone(embedder));
    }
    let maintenance = MaintenanceService::new(paths.clone(), Arc::clone(store), Arc::clone(journal));

    Snapshot {
        config,
        embedder,
        recall,
        checkpoint,
        maintenance,
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::storage("encode_result", e))
}
