//! Ledger repository implementation

use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::models::LedgerRow;

const SELECT_COLUMNS: &str = "id, local_uid, remote_uid, list_name, title, \
     last_sync_hash, local_modified, remote_modified, last_synced_at";

/// Trait for ledger storage operations.
///
/// Every operation takes the cancellation token and fails with
/// [`Error::Cancelled`] once shutdown has been requested, so a reconcile pass
/// in flight stops at the next ledger touch.
pub trait LedgerStore: Send + Sync {
    /// Get the row tracking the given Reminders UID, if any
    fn get_by_local_uid(&self, cancel: &CancelToken, uid: &str) -> Result<Option<LedgerRow>>;

    /// Get the row tracking the given Home Assistant UID, if any
    fn get_by_remote_uid(&self, cancel: &CancelToken, uid: &str) -> Result<Option<LedgerRow>>;

    /// All tracked rows for the given Reminders list name
    fn get_all_for_list(&self, cancel: &CancelToken, list_name: &str) -> Result<Vec<LedgerRow>>;

    /// Insert or update a row. On insert, `row.id` is set to the new row id.
    fn upsert(&self, cancel: &CancelToken, row: &mut LedgerRow) -> Result<()>;

    /// Remove the row with the given id
    fn delete(&self, cancel: &CancelToken, id: i64) -> Result<()>;

    /// Whether the ledger has no rows at all (fresh install)
    fn is_empty(&self, cancel: &CancelToken) -> Result<bool>;
}

/// `SQLite` implementation of [`LedgerStore`].
///
/// The connection sits behind a mutex: the reconciler is the only writer, but
/// observability readers may poke at the store from other tasks. WAL mode
/// keeps those readers from stalling the writer, and each lock is held for a
/// single statement only.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Create a store over an opened [`Database`](super::Database).
    #[must_use]
    pub fn new(db: super::Database) -> Self {
        Self {
            conn: Mutex::new(db.into_connection()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoning panic cannot leave a half-applied statement behind;
        // recover the guard rather than propagating the panic.
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerRow> {
        Ok(LedgerRow {
            id: row.get(0)?,
            local_uid: row.get(1)?,
            remote_uid: row.get(2)?,
            list_name: row.get(3)?,
            title: row.get(4)?,
            last_sync_hash: row.get(5)?,
            local_modified: parse_time(&row.get::<_, String>(6)?),
            remote_modified: parse_time(&row.get::<_, String>(7)?),
            last_synced_at: parse_time(&row.get::<_, String>(8)?),
        })
    }

    fn get_by_column(&self, column: &str, uid: &str) -> Result<Option<LedgerRow>> {
        let conn = self.lock();
        let query =
            format!("SELECT {SELECT_COLUMNS} FROM ledger_items WHERE {column} = ?");
        let row = conn
            .query_row(&query, params![uid], Self::parse_row)
            .optional()?;
        Ok(row)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get_by_local_uid(&self, cancel: &CancelToken, uid: &str) -> Result<Option<LedgerRow>> {
        ensure_live(cancel)?;
        self.get_by_column("local_uid", uid)
    }

    fn get_by_remote_uid(&self, cancel: &CancelToken, uid: &str) -> Result<Option<LedgerRow>> {
        ensure_live(cancel)?;
        self.get_by_column("remote_uid", uid)
    }

    fn get_all_for_list(&self, cancel: &CancelToken, list_name: &str) -> Result<Vec<LedgerRow>> {
        ensure_live(cancel)?;
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM ledger_items WHERE list_name = ?"
        ))?;

        let rows = stmt
            .query_map(params![list_name], Self::parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn upsert(&self, cancel: &CancelToken, row: &mut LedgerRow) -> Result<()> {
        ensure_live(cancel)?;
        let conn = self.lock();

        // Resolve the target row: by id if known, otherwise by whichever UID
        // is populated. Keying on local_uid first mirrors the lookup order of
        // the unique indexes.
        if row.id == 0 {
            let existing: Option<i64> = if !row.local_uid.is_empty() {
                conn.query_row(
                    "SELECT id FROM ledger_items WHERE local_uid = ?",
                    params![row.local_uid],
                    |r| r.get(0),
                )
                .optional()?
            } else if !row.remote_uid.is_empty() {
                conn.query_row(
                    "SELECT id FROM ledger_items WHERE remote_uid = ?",
                    params![row.remote_uid],
                    |r| r.get(0),
                )
                .optional()?
            } else {
                None
            };
            if let Some(id) = existing {
                row.id = id;
            }
        }

        if row.id > 0 {
            conn.execute(
                "UPDATE ledger_items SET
                     local_uid = ?, remote_uid = ?, list_name = ?, title = ?,
                     last_sync_hash = ?, local_modified = ?, remote_modified = ?,
                     last_synced_at = ?
                 WHERE id = ?",
                params![
                    row.local_uid,
                    row.remote_uid,
                    row.list_name,
                    row.title,
                    row.last_sync_hash,
                    format_time(row.local_modified),
                    format_time(row.remote_modified),
                    format_time(row.last_synced_at),
                    row.id,
                ],
            )?;
        } else {
            conn.execute(
                "INSERT INTO ledger_items
                     (local_uid, remote_uid, list_name, title, last_sync_hash,
                      local_modified, remote_modified, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    row.local_uid,
                    row.remote_uid,
                    row.list_name,
                    row.title,
                    row.last_sync_hash,
                    format_time(row.local_modified),
                    format_time(row.remote_modified),
                    format_time(row.last_synced_at),
                ],
            )?;
            row.id = conn.last_insert_rowid();
        }

        Ok(())
    }

    fn delete(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        ensure_live(cancel)?;
        let conn = self.lock();
        conn.execute("DELETE FROM ledger_items WHERE id = ?", params![id])?;
        Ok(())
    }

    fn is_empty(&self, cancel: &CancelToken) -> Result<bool> {
        ensure_live(cancel)?;
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ledger_items", [], |r| r.get(0))?;
        Ok(count == 0)
    }
}

fn ensure_live(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// RFC 3339 with nanosecond precision in UTC; empty string for absent.
fn format_time(t: Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Nanos, true),
        None => String::new(),
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::TimeZone;

    fn setup() -> SqliteLedgerStore {
        SqliteLedgerStore::new(Database::open_in_memory().unwrap())
    }

    fn sample_row(local_uid: &str, remote_uid: &str) -> LedgerRow {
        LedgerRow {
            local_uid: local_uid.into(),
            remote_uid: remote_uid.into(),
            list_name: "Shopping".into(),
            title: "Buy milk".into(),
            last_sync_hash: "abc123".into(),
            local_modified: Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()),
            remote_modified: None,
            last_synced_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 5).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let store = setup();
        let cancel = CancelToken::never();

        let mut row = sample_row("rem-1", "ha-1");
        store.upsert(&cancel, &mut row).unwrap();
        assert!(row.id > 0);

        let by_local = store.get_by_local_uid(&cancel, "rem-1").unwrap().unwrap();
        assert_eq!(by_local, row);

        let by_remote = store.get_by_remote_uid(&cancel, "ha-1").unwrap().unwrap();
        assert_eq!(by_remote.id, row.id);

        assert!(store.get_by_local_uid(&cancel, "nope").unwrap().is_none());
    }

    #[test]
    fn test_upsert_updates_existing_by_local_uid() {
        let store = setup();
        let cancel = CancelToken::never();

        let mut row = sample_row("rem-1", "ha-1");
        store.upsert(&cancel, &mut row).unwrap();
        let first_id = row.id;

        let mut updated = sample_row("rem-1", "ha-1");
        updated.title = "Buy whole milk".into();
        updated.last_sync_hash = "def456".into();
        store.upsert(&cancel, &mut updated).unwrap();
        assert_eq!(updated.id, first_id);

        let fetched = store.get_by_local_uid(&cancel, "rem-1").unwrap().unwrap();
        assert_eq!(fetched.title, "Buy whole milk");
        assert_eq!(fetched.last_sync_hash, "def456");

        // Still a single row.
        assert_eq!(store.get_all_for_list(&cancel, "Shopping").unwrap().len(), 1);
    }

    #[test]
    fn test_get_all_for_list() {
        let store = setup();
        let cancel = CancelToken::never();

        let mut a = sample_row("rem-1", "ha-1");
        let mut b = sample_row("rem-2", "ha-2");
        let mut c = sample_row("rem-3", "ha-3");
        c.list_name = "Work".into();
        store.upsert(&cancel, &mut a).unwrap();
        store.upsert(&cancel, &mut b).unwrap();
        store.upsert(&cancel, &mut c).unwrap();

        let shopping = store.get_all_for_list(&cancel, "Shopping").unwrap();
        assert_eq!(shopping.len(), 2);

        let work = store.get_all_for_list(&cancel, "Work").unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].local_uid, "rem-3");
    }

    #[test]
    fn test_delete() {
        let store = setup();
        let cancel = CancelToken::never();

        let mut row = sample_row("rem-1", "ha-1");
        store.upsert(&cancel, &mut row).unwrap();
        store.delete(&cancel, row.id).unwrap();

        assert!(store.get_by_local_uid(&cancel, "rem-1").unwrap().is_none());
        assert!(store.is_empty(&cancel).unwrap());
    }

    #[test]
    fn test_is_empty() {
        let store = setup();
        let cancel = CancelToken::never();

        assert!(store.is_empty(&cancel).unwrap());
        let mut row = sample_row("rem-1", "ha-1");
        store.upsert(&cancel, &mut row).unwrap();
        assert!(!store.is_empty(&cancel).unwrap());
    }

    #[test]
    fn test_timestamp_round_trip_preserves_nanoseconds() {
        let store = setup();
        let cancel = CancelToken::never();

        let precise = Utc
            .timestamp_opt(1_767_225_600, 123_456_789)
            .single()
            .unwrap();
        let mut row = sample_row("rem-1", "ha-1");
        row.local_modified = Some(precise);
        row.remote_modified = None; // zero instant stays absent
        store.upsert(&cancel, &mut row).unwrap();

        let fetched = store.get_by_local_uid(&cancel, "rem-1").unwrap().unwrap();
        assert_eq!(fetched.local_modified, Some(precise));
        assert_eq!(fetched.remote_modified, None);
    }

    #[test]
    fn test_operations_fail_once_cancelled() {
        let store = setup();
        let (handle, cancel) = CancelToken::new();
        handle.cancel();

        let err = store.is_empty(&cancel).unwrap_err();
        assert!(err.is_cancelled());

        let mut row = sample_row("rem-1", "ha-1");
        assert!(store.upsert(&cancel, &mut row).unwrap_err().is_cancelled());
    }

    #[test]
    fn test_format_time_zero_instant_is_empty_string() {
        assert_eq!(format_time(None), "");
        assert_eq!(parse_time(""), None);
    }
}
