//! Forward-only `SQLite` schema migrations.
//!
//! Every migration is additive (`CREATE ... IF NOT EXISTS`) and recorded in
//! `schema_migrations`, so running the list again is harmless.

use crate::{Error, Result};
use rusqlite::{Connection, params};

/// A single migration with version and SQL.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Migration version (sequential, starting at 1).
    pub version: i64,
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to apply; may hold several statements.
    pub sql: &'static str,
}

/// The item store schema.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "memory items",
        sql: "CREATE TABLE IF NOT EXISTS memory_items (
                  id TEXT PRIMARY KEY,
                  agent_id TEXT NOT NULL,
                  kind TEXT NOT NULL,
                  title TEXT NOT NULL,
                  content TEXT NOT NULL,
                  importance INTEGER NOT NULL,
                  confidence REAL NOT NULL,
                  status TEXT NOT NULL,
                  created_at TEXT NOT NULL,
                  updated_at TEXT NOT NULL
              );
              CREATE INDEX IF NOT EXISTS idx_memory_items_recall
                  ON memory_items (agent_id, status, importance DESC, updated_at DESC);",
    },
    Migration {
        version: 2,
        description: "full-text index",
        sql: "CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts
                  USING fts5(id UNINDEXED, title, content);",
    },
    Migration {
        version: 3,
        description: "embeddings",
        sql: "CREATE TABLE IF NOT EXISTS memory_embeddings (
                  memory_id TEXT PRIMARY KEY,
                  agent_id TEXT NOT NULL,
                  model TEXT NOT NULL,
                  vector_json TEXT NOT NULL,
                  updated_at TEXT NOT NULL
              );
              CREATE INDEX IF NOT EXISTS idx_memory_embeddings_agent
                  ON memory_embeddings (agent_id, updated_at DESC);",
    },
];

/// Applies every migration newer than the recorded version.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a migration fails; that migration
/// is rolled back.
pub fn run(conn: &Connection, migrations: &[Migration]) -> Result<i64> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version INTEGER PRIMARY KEY,
             description TEXT NOT NULL,
             applied_at TEXT NOT NULL
         );",
    )
    .map_err(|e| Error::storage("create_migrations_table", e))?;

    let applied = current_version(conn)?;
    let mut current = applied;
    for migration in migrations.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
        tracing::debug!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
        current = migration.version;
    }
    Ok(current)
}

/// Highest applied version, 0 when none.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the tracking table cannot be read.
pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| Error::storage("read_migration_version", e))
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| Error::storage("begin_transaction", e))?;

    let result = conn
        .execute_batch(migration.sql)
        .and_then(|()| {
            conn.execute(
                "INSERT INTO schema_migrations (version, description, applied_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    migration.version,
                    migration.description,
                    crate::models::format_timestamp(&chrono::Utc::now())
                ],
            )
        })
        .map_err(|e| Error::OperationFailed {
            operation: format!("migration_v{}", migration.version),
            cause: e.to_string(),
        });

    if result.is_ok() {
        conn.execute("COMMIT", [])
            .map_err(|e| Error::storage("commit_transaction", e))?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }
    result.map(|_| ())
}
