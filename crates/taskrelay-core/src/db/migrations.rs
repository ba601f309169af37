//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|v| v != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: ledger schema
///
/// Timestamps are stored as RFC 3339 strings with nanosecond precision in
/// UTC; the empty string denotes "absent". The partial unique indexes enforce
/// at-most-one-row-per-UID on each side while still allowing rows whose
/// counterpart UID has not been discovered yet.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS ledger_items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            local_uid       TEXT NOT NULL DEFAULT '',
            remote_uid      TEXT NOT NULL DEFAULT '',
            list_name       TEXT NOT NULL,
            title           TEXT NOT NULL,
            last_sync_hash  TEXT NOT NULL DEFAULT '',
            local_modified  TEXT NOT NULL DEFAULT '',
            remote_modified TEXT NOT NULL DEFAULT '',
            last_synced_at  TEXT NOT NULL DEFAULT ''
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_local_uid
            ON ledger_items (local_uid) WHERE local_uid != '';
        CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_remote_uid
            ON ledger_items (remote_uid) WHERE remote_uid != '';
        CREATE INDEX IF NOT EXISTS idx_ledger_list_name
            ON ledger_items (list_name);
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;
        ",
    )?;

    tracing::info!("Migrated ledger database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v1_creates_ledger_table() {
        let conn = setup();
        run(&conn).unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'ledger_items'
                )",
                [],
                |row| row.get::<_, i32>(0).map(|v| v != 0),
            )
            .unwrap();

        assert!(exists);
    }
}
