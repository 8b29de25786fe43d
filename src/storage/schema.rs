//! Versioned schema for the index database.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

const TABLES: [&str; 2] = ["documents", "chunks"];

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current = current_version(conn)?;
    tracing::debug!(current, target = SCHEMA_VERSION, "Checking database migrations");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn current_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Migration(format!("failed to get version: {e}")).into())
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, chrono::Utc::now().timestamp()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;
    Ok(())
}

/// v1: documents and their chunks.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: documents and chunks");

    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            text TEXT NOT NULL,
            metadata TEXT NOT NULL,  -- JSON object
            last_modified REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL  -- JSON object
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document);
        ",
    )
    .map_err(|e| StorageError::Migration(format!("v1 migration failed: {e}")))?;

    record_migration(conn, 1)
}

/// Check every expected table exists.
///
/// # Errors
///
/// Returns an error naming the first missing table.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in TABLES {
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                [table],
                |_| Ok(()),
            )
            .is_ok();

        if !exists {
            return Err(StorageError::Migration(format!("table '{table}' not found")).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            migrate(conn)?;
            verify_schema(conn)?;
            assert_eq!(current_version(conn)?, SCHEMA_VERSION);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_verify_fails_before_migration() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_conn(verify_schema);
        assert!(result.is_err());
    }
}
