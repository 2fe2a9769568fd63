//! `SQLite`-backed item store with FTS5 and embedding indexes.
//!
//! One store per agent database. Every mutation runs the item-row statement
//! and both index statements in a single `BEGIN IMMEDIATE` transaction:
//!
//! - the FTS table holds a row for an item iff it is `active`;
//! - the embedding table holds a row for an item only while it is `active`.

use super::connection::{acquire_lock, configure_connection, is_missing_table, with_transaction};
use super::fts::build_match_query;
use super::migrations::{self, MIGRATIONS};
use super::vector::{cosine_similarity, decode_vector, encode_vector};
use crate::cancel::CancelToken;
use crate::models::{Health, ItemStatus, MemoryItem, SearchParams, format_timestamp};
use crate::observability::metrics::record_storage;
use crate::services::path_manager::{ensure_dir, validate_agent_id};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// Default `list` limit.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Largest `list` limit.
pub const MAX_LIST_LIMIT: usize = 20_000;

/// Largest `search_by_embedding` limit.
pub const MAX_VECTOR_LIMIT: usize = 100;

const ITEM_COLUMNS: &str = "m.id, m.agent_id, m.kind, m.title, m.content, m.importance, \
                            m.confidence, m.status, m.created_at, m.updated_at";

/// An item with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    /// The item.
    pub item: MemoryItem,
    /// Cosine similarity to the query vector.
    pub score: f64,
}

/// Which secondary indexes hold a row for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexPresence {
    /// A full-text row exists.
    pub fts: bool,
    /// An embedding row exists.
    pub embedding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Upsert,
    Update,
}

impl WriteMode {
    const fn operation(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Update => "update",
        }
    }
}

/// Durable item records for one agent.
pub struct ItemStore {
    agent_id: String,
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl ItemStore {
    /// Opens (creating if needed) the database at `path` for `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad agent id, or
    /// [`Error::OperationFailed`] if the database cannot be opened or
    /// migrated.
    pub fn open(path: impl AsRef<Path>, agent_id: &str) -> Result<Self> {
        let agent_id = validate_agent_id(agent_id)?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| Error::OperationFailed {
            operation: "open_item_store".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::init(conn, agent_id, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad agent id, or
    /// [`Error::OperationFailed`] if the schema cannot be created.
    pub fn in_memory(agent_id: &str) -> Result<Self> {
        let agent_id = validate_agent_id(agent_id)?;
        let conn =
            Connection::open_in_memory().map_err(|e| Error::storage("open_item_store", e))?;
        Self::init(conn, agent_id, None)
    }

    fn init(conn: Connection, agent_id: &str, db_path: Option<PathBuf>) -> Result<Self> {
        configure_connection(&conn)?;
        migrations::run(&conn, MIGRATIONS)?;
        Ok(Self {
            agent_id: agent_id.to_string(),
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// The owning agent.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The database file, `None` for in-memory stores.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Creates or replaces an item.
    ///
    /// Normalizes the item, assigns an id when missing, stamps `created_at`
    /// on insert and `updated_at` always, then resynchronizes the indexes.
    ///
    /// # Errors
    ///
    /// - [`Error::PolicyDenied`] if the item (or the stored row) belongs to
    ///   another agent
    /// - [`Error::InvalidInput`] if an active item has an empty title or
    ///   content
    /// - [`Error::Cancelled`] if `cancel` fires between statements
    /// - [`Error::OperationFailed`] on storage failure
    #[instrument(skip(self, item, cancel), fields(operation = "upsert", agent_id = %self.agent_id, memory.id = %item.id))]
    pub fn upsert(&self, item: MemoryItem, cancel: &CancelToken) -> Result<MemoryItem> {
        let start = Instant::now();
        let result = self.write_item(item, WriteMode::Upsert, cancel);
        record_storage("upsert", start, &result);
        result
    }

    /// Updates an existing item, preserving `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no row exists for this agent and id;
    /// otherwise as [`ItemStore::upsert`].
    #[instrument(skip(self, item, cancel), fields(operation = "update", agent_id = %self.agent_id, memory.id = %item.id))]
    pub fn update(&self, item: MemoryItem, cancel: &CancelToken) -> Result<MemoryItem> {
        let start = Instant::now();
        let result = self.write_item(item, WriteMode::Update, cancel);
        record_storage("update", start, &result);
        result
    }

    fn write_item(
        &self,
        item: MemoryItem,
        mode: WriteMode,
        cancel: &CancelToken,
    ) -> Result<MemoryItem> {
        let operation = mode.operation();
        cancel.check(operation)?;

        let mut item = item.normalized();
        if item.agent_id.is_empty() {
            item.agent_id.clone_from(&self.agent_id);
        } else if item.agent_id != self.agent_id {
            return Err(Error::PolicyDenied(format!(
                "item belongs to agent '{}', store belongs to '{}'",
                item.agent_id, self.agent_id
            )));
        }
        if item.is_active() && (item.title.is_empty() || item.content.is_empty()) {
            return Err(Error::InvalidInput(
                "title and content are required for active items".to_string(),
            ));
        }
        if item.id.is_empty() {
            if mode == WriteMode::Update {
                return Err(Error::InvalidInput("id is required".to_string()));
            }
            item.id = uuid::Uuid::new_v4().to_string();
        }

        let now = format_timestamp(&Utc::now());
        let conn = acquire_lock(&self.conn);
        with_transaction(&conn, || {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT agent_id FROM memory_items WHERE id = ?1",
                    params![item.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::storage("lookup_item", e))?;
            match owner.as_deref() {
                None if mode == WriteMode::Update => {
                    return Err(Error::NotFound(format!("item {}", item.id)));
                },
                Some(owner) if owner != self.agent_id => {
                    return Err(if mode == WriteMode::Update {
                        Error::NotFound(format!("item {}", item.id))
                    } else {
                        Error::PolicyDenied(format!("item {} belongs to another agent", item.id))
                    });
                },
                _ => {},
            }

            conn.execute(
                "INSERT INTO memory_items
                     (id, agent_id, kind, title, content, importance, confidence, status,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     kind = excluded.kind,
                     title = excluded.title,
                     content = excluded.content,
                     importance = excluded.importance,
                     confidence = excluded.confidence,
                     status = excluded.status,
                     updated_at = excluded.updated_at",
                params![
                    item.id,
                    item.agent_id,
                    item.kind,
                    item.title,
                    item.content,
                    item.importance,
                    item.confidence,
                    item.status.as_str(),
                    now,
                ],
            )
            .map_err(|e| Error::storage("write_item", e))?;

            cancel.check(operation)?;
            sync_indexes(&conn, &item.id, item.status)?;

            fetch_item(&conn, &self.agent_id, &item.id)?
                .ok_or_else(|| Error::storage(operation, "item vanished inside transaction"))
        })
    }

    /// Reads one item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, cancel), fields(operation = "get", agent_id = %self.agent_id, memory.id = %id))]
    pub fn get(&self, id: &str, cancel: &CancelToken) -> Result<Option<MemoryItem>> {
        cancel.check("get")?;
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = fetch_item(&conn, &self.agent_id, id.trim());
        record_storage("get", start, &result);
        result
    }

    /// Marks an active item `forgotten` and drops its index rows.
    ///
    /// Returns true iff an active row was changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, cancel), fields(operation = "forget", agent_id = %self.agent_id, memory.id = %id))]
    pub fn forget(&self, id: &str, cancel: &CancelToken) -> Result<bool> {
        self.retire(id, ItemStatus::Forgotten, "forget", cancel)
    }

    /// Marks an active item `archived` and drops its index rows.
    ///
    /// Returns true iff an active row was changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, cancel), fields(operation = "archive", agent_id = %self.agent_id, memory.id = %id))]
    pub fn archive(&self, id: &str, cancel: &CancelToken) -> Result<bool> {
        self.retire(id, ItemStatus::Archived, "archive", cancel)
    }

    fn retire(
        &self,
        id: &str,
        status: ItemStatus,
        operation: &'static str,
        cancel: &CancelToken,
    ) -> Result<bool> {
        cancel.check(operation)?;
        let start = Instant::now();
        let id = id.trim();
        let now = format_timestamp(&Utc::now());
        let conn = acquire_lock(&self.conn);
        let result = with_transaction(&conn, || {
            let changed = conn
                .execute(
                    "UPDATE memory_items SET status = ?1, updated_at = ?2
                     WHERE id = ?3 AND agent_id = ?4 AND status = 'active'",
                    params![status.as_str(), now, id, self.agent_id],
                )
                .map_err(|e| Error::storage(operation, e))?;
            if changed == 0 {
                return Ok(false);
            }
            cancel.check(operation)?;
            sync_indexes(&conn, id, status)?;
            Ok(true)
        });
        record_storage(operation, start, &result);
        result
    }

    /// Lists items with `status`, most recently updated first.
    ///
    /// `limit` 0 means 1000; it is clamped to 1..=20000.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, cancel), fields(operation = "list", agent_id = %self.agent_id))]
    pub fn list(
        &self,
        status: ItemStatus,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<MemoryItem>> {
        cancel.check("list")?;
        let start = Instant::now();
        let limit = if limit == 0 {
            DEFAULT_LIST_LIMIT
        } else {
            limit.min(MAX_LIST_LIMIT)
        };
        let conn = acquire_lock(&self.conn);
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM memory_items m
             WHERE m.agent_id = ?1 AND m.status = ?2
             ORDER BY m.updated_at DESC
             LIMIT ?3"
        );
        let result = query_items(
            &conn,
            &sql,
            params![self.agent_id, status.as_str(), to_sql_limit(limit)],
        )
        .map_err(|e| Error::storage("list", e));
        record_storage("list", start, &result);
        result
    }

    /// Lexical recall.
    ///
    /// An empty query lists by importance then recency. Otherwise tokens are
    /// AND-joined into an FTS5 query ranked by BM25, then importance, then
    /// recency. A missing index reads as no matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, params, cancel), fields(operation = "search", agent_id = %self.agent_id, query_length = params.query.len()))]
    pub fn search(&self, params: &SearchParams, cancel: &CancelToken) -> Result<Vec<MemoryItem>> {
        cancel.check("search")?;
        let start = Instant::now();
        let p = params.normalized();
        let limit = to_sql_limit(p.limit);
        let conn = acquire_lock(&self.conn);

        let rows = if p.query.is_empty() {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM memory_items m
                 WHERE m.agent_id = ?1 AND m.status = ?2 AND m.importance >= ?3
                 ORDER BY m.importance DESC, m.updated_at DESC
                 LIMIT ?4"
            );
            query_items(
                &conn,
                &sql,
                params![self.agent_id, p.status.as_str(), p.min_importance, limit],
            )
        } else if let Some(fts_query) = build_match_query(&p.query) {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM memory_fts f
                 JOIN memory_items m ON m.id = f.id
                 WHERE memory_fts MATCH ?1
                   AND m.agent_id = ?2 AND m.status = ?3 AND m.importance >= ?4
                 ORDER BY bm25(memory_fts), m.importance DESC, m.updated_at DESC
                 LIMIT ?5"
            );
            query_items(
                &conn,
                &sql,
                params![fts_query, self.agent_id, p.status.as_str(), p.min_importance, limit],
            )
        } else {
            Ok(Vec::new())
        };

        let result = empty_if_missing(rows, "search");
        record_storage("search", start, &result);
        result
    }

    /// Stores the embedding for an active item.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty id, model or vector, or a
    ///   non-finite component
    /// - [`Error::NotFound`] if the item is missing or not active
    /// - [`Error::OperationFailed`] on storage failure
    #[instrument(skip(self, vector, cancel), fields(operation = "upsert_embedding", agent_id = %self.agent_id, memory.id = %id, dims = vector.len()))]
    pub fn upsert_embedding(
        &self,
        id: &str,
        model: &str,
        vector: &[f32],
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check("upsert_embedding")?;
        let (id, model) = (id.trim(), model.trim());
        if id.is_empty() || model.is_empty() || vector.is_empty() {
            return Err(Error::InvalidInput(
                "embedding requires id, model and a non-empty vector".to_string(),
            ));
        }
        let vector_json = encode_vector(vector)?;
        let start = Instant::now();
        let now = format_timestamp(&Utc::now());
        let conn = acquire_lock(&self.conn);
        let result = with_transaction(&conn, || {
            let active: Option<String> = conn
                .query_row(
                    "SELECT id FROM memory_items
                     WHERE id = ?1 AND agent_id = ?2 AND status = 'active'",
                    params![id, self.agent_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::storage("lookup_item", e))?;
            if active.is_none() {
                return Err(Error::NotFound(format!("active item {id}")));
            }
            conn.execute(
                "INSERT INTO memory_embeddings (memory_id, agent_id, model, vector_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(memory_id) DO UPDATE SET
                     model = excluded.model,
                     vector_json = excluded.vector_json,
                     updated_at = excluded.updated_at",
                params![id, self.agent_id, model, vector_json, now],
            )
            .map_err(|e| Error::storage("upsert_embedding", e))?;
            Ok(())
        });
        record_storage("upsert_embedding", start, &result);
        result
    }

    /// Vector recall by cosine similarity.
    ///
    /// Candidates scoring `<= 0` or NaN are dropped; ties go to the more
    /// recently updated item. `limit` is clamped to 1..=100. A missing
    /// index reads as no matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, query, cancel), fields(operation = "search_by_embedding", agent_id = %self.agent_id, dims = query.len()))]
    pub fn search_by_embedding(
        &self,
        query: &[f32],
        limit: usize,
        min_importance: i64,
        status: ItemStatus,
        cancel: &CancelToken,
    ) -> Result<Vec<ScoredItem>> {
        cancel.check("search_by_embedding")?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let limit = limit.clamp(1, MAX_VECTOR_LIMIT);
        let sql = format!(
            "SELECT {ITEM_COLUMNS}, e.vector_json FROM memory_embeddings e
             JOIN memory_items m ON m.id = e.memory_id
             WHERE e.agent_id = ?1 AND m.agent_id = ?1 AND m.status = ?2 AND m.importance >= ?3"
        );

        let conn = acquire_lock(&self.conn);
        let rows = (|| {
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(
                params![self.agent_id, status.as_str(), min_importance],
                |row| Ok((item_from_row(row)?, row.get::<_, String>(10)?)),
            )?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()
        })();
        drop(conn);

        let result = empty_if_missing(rows, "search_by_embedding").and_then(|rows| {
            let mut scored = Vec::with_capacity(rows.len());
            for (item, vector_json) in rows {
                let vector = decode_vector(&vector_json)?;
                let score = cosine_similarity(query, &vector);
                if score.is_nan() || score <= 0.0 {
                    continue;
                }
                scored.push(ScoredItem { item, score });
            }
            scored.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| b.item.updated_at.cmp(&a.item.updated_at))
            });
            scored.truncate(limit);
            Ok(scored)
        });
        record_storage("search_by_embedding", start, &result);
        result
    }

    /// Reports which secondary indexes hold a row for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    pub fn index_presence(&self, id: &str) -> Result<IndexPresence> {
        let conn = acquire_lock(&self.conn);
        let count = |sql: &str| -> Result<bool> {
            conn.query_row(sql, params![id], |row| row.get::<_, i64>(0))
                .map(|n| n > 0)
                .map_err(|e| Error::storage("index_presence", e))
        };
        Ok(IndexPresence {
            fts: count("SELECT COUNT(*) FROM memory_fts WHERE id = ?1")?,
            embedding: count("SELECT COUNT(*) FROM memory_embeddings WHERE memory_id = ?1")?,
        })
    }

    /// Item counts per status and on-disk size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on storage failure.
    #[instrument(skip(self, cancel), fields(operation = "health", agent_id = %self.agent_id))]
    pub fn health(&self, cancel: &CancelToken) -> Result<Health> {
        cancel.check("health")?;
        let conn = acquire_lock(&self.conn);
        let counts = (|| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM memory_items WHERE agent_id = ?1 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![self.agent_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })()
        .map_err(|e| Error::storage("health", e))?;
        drop(conn);

        let mut health = Health {
            db_path: self
                .db_path
                .as_ref()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
            db_size_bytes: self
                .db_path
                .as_ref()
                .and_then(|p| std::fs::metadata(p).ok())
                .map_or(0, |m| m.len()),
            ..Health::default()
        };
        for (status, count) in counts {
            let count = u64::try_from(count).unwrap_or(0);
            health.total_items += count;
            match ItemStatus::parse(&status) {
                ItemStatus::Active => health.active_items += count,
                ItemStatus::Forgotten => health.forgotten_items += count,
                ItemStatus::Archived => health.archived_items += count,
            }
        }
        Ok(health)
    }

    /// Compacts the database file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if `VACUUM` fails.
    #[instrument(skip(self, cancel), fields(operation = "vacuum", agent_id = %self.agent_id))]
    pub fn vacuum(&self, cancel: &CancelToken) -> Result<()> {
        cancel.check("vacuum")?;
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = conn
            .execute_batch("VACUUM")
            .map_err(|e| Error::storage("vacuum", e));
        record_storage("vacuum", start, &result);
        result
    }
}

/// Deletes the FTS row for `id`, re-inserts it when active, and drops the
/// embedding row otherwise.
fn sync_indexes(conn: &Connection, id: &str, status: ItemStatus) -> Result<()> {
    conn.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])
        .map_err(|e| Error::storage("delete_fts", e))?;
    if status == ItemStatus::Active {
        conn.execute(
            "INSERT INTO memory_fts (id, title, content)
             SELECT id, title, content FROM memory_items WHERE id = ?1",
            params![id],
        )
        .map_err(|e| Error::storage("insert_fts", e))?;
    } else {
        conn.execute(
            "DELETE FROM memory_embeddings WHERE memory_id = ?1",
            params![id],
        )
        .map_err(|e| Error::storage("delete_embedding", e))?;
    }
    Ok(())
}

fn fetch_item(conn: &Connection, agent_id: &str, id: &str) -> Result<Option<MemoryItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM memory_items m WHERE m.id = ?1 AND m.agent_id = ?2");
    conn.query_row(&sql, params![id, agent_id], item_from_row)
        .optional()
        .map_err(|e| Error::storage("get_item", e))
}

fn query_items(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<MemoryItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, item_from_row)?;
    rows.collect()
}

fn empty_if_missing<T>(rows: rusqlite::Result<Vec<T>>, operation: &str) -> Result<Vec<T>> {
    match rows {
        Ok(rows) => Ok(rows),
        Err(e) if is_missing_table(&e) => {
            tracing::debug!(operation, error = %e, "Index not ready, returning no matches");
            Ok(Vec::new())
        },
        Err(e) => Err(Error::storage(operation, e)),
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    let status: String = row.get(7)?;
    Ok(MemoryItem {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        importance: row.get(5)?,
        confidence: row.get(6)?,
        status: ItemStatus::parse(&status),
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
