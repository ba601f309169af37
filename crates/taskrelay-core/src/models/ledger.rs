//! Ledger row model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single tracked pair in the sync ledger.
///
/// One row exists per item pair that has been synced at least once. The row
/// is the authoritative link between the two sides: UID equality across
/// Reminders and Home Assistant carries no meaning without it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Database row identifier (assigned on insert).
    pub id: i64,
    /// Reminders UID; empty until the local side has the item.
    pub local_uid: String,
    /// Home Assistant todo item UID; empty until the remote side has the item.
    pub remote_uid: String,
    /// Reminders list this pair belongs to.
    pub list_name: String,
    /// Title at the last successful sync. Used to address the remote item,
    /// which HA identifies by title rather than UID.
    pub title: String,
    /// Content hash of both sides at the last successful sync.
    pub last_sync_hash: String,
    /// `modified_at` observed on the local side at last sync.
    pub local_modified: Option<DateTime<Utc>>,
    /// `modified_at` observed on the remote side at last sync.
    pub remote_modified: Option<DateTime<Utc>>,
    /// Wall-clock moment of the last successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,
}
