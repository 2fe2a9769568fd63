//! Shared connection handling for the `SQLite` item store.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Acquires the connection lock, recovering from poison.
///
/// A panic inside a previous critical section leaves the connection usable
/// (every mutation runs in a transaction that `SQLite` rolls back), so the
/// guard is recovered and a warning is logged.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL sync and a 5 second busy timeout.
///
/// `journal_mode` returns a row, so each pragma is applied on its own and
/// failures on in-memory databases (which cannot use WAL) are ignored.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(std::time::Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))
        .map_err(|e| Error::storage("configure_connection", e))
}

/// Returns true for errors caused by a table that does not exist yet.
pub fn is_missing_table(err: &rusqlite::Error) -> bool {
    err.to_string().contains("no such table")
}

/// Runs `body` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
///
/// # Errors
///
/// Returns the body's error, or [`Error::OperationFailed`] if the
/// transaction cannot be opened or committed.
pub fn with_transaction<T>(conn: &Connection, body: impl FnOnce() -> Result<T>) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| Error::storage("begin_transaction", e))?;

    let result = body();

    if result.is_ok() {
        if let Err(e) = conn.execute("COMMIT", []) {
            let _ = conn.execute("ROLLBACK", []);
            return Err(Error::storage("commit_transaction", e));
        }
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_lock_recovers_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let clone = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(mutex.is_poisoned());
        assert_eq!(*acquire_lock(&mutex), 1);
    }

    #[test]
    fn test_transaction_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        let result: Result<()> = with_transaction(&conn, || {
            conn.execute("INSERT INTO t VALUES (1)", [])
                .map_err(|e| Error::storage("insert", e))?;
            Err(Error::storage("later", "boom"))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_missing_table_detection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 1 FROM nowhere", [], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(is_missing_table(&err));
    }
}
