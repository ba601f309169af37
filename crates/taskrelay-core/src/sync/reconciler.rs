//! The reconciliation core: three-way comparison between Reminders, Home
//! Assistant, and the ledger, producing and executing an action plan.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::cancel::CancelToken;
use crate::db::LedgerStore;
use crate::error::Error;
use crate::models::{Item, LedgerRow};

use super::{LocalSource, RemoteSource};

/// A single mutation the reconciler wants to perform for a tracked row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Nothing changed on either side.
    None,
    /// Reminders is the winner → push to HA.
    UpdateRemote,
    /// HA is the winner → push to Reminders.
    UpdateLocal,
    /// Item deleted from Reminders → remove from HA (also the cleanup path
    /// when both sides are already gone).
    DeleteRemote,
    /// Item deleted from HA → remove from Reminders.
    DeleteLocal,
}

/// Mutation counts for a single reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl SyncStats {
    fn merge(&mut self, other: SyncStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.conflicts += other.conflicts;
        self.errors += other.errors;
    }
}

/// Outcome of a reconcile pass: aggregate statistics plus the first error
/// observed. Individual item errors do not abort the pass; the reconciler
/// keeps going to maximize progress.
#[derive(Debug, Default)]
pub struct PassReport {
    pub stats: SyncStats,
    pub first_error: Option<Error>,
}

impl PassReport {
    fn record_error(&mut self, err: Error) {
        self.stats.errors += 1;
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

/// Performs a single bidirectional sync pass across configured list
/// mappings. Stateless between calls; all persistent state lives in the
/// [`LedgerStore`].
///
/// Known limitation: because HA's `add_item` returns no UID, newly pushed
/// items are re-identified by exact title after a refetch. Two items with
/// the same title in one entity can therefore be misattributed.
pub struct Reconciler<L, R, S> {
    local: L,
    remote: R,
    store: S,
}

impl<L, R, S> Reconciler<L, R, S>
where
    L: LocalSource,
    R: RemoteSource,
    S: LedgerStore,
{
    /// Creates a reconciler wired to the given adapters and ledger store.
    pub fn new(local: L, remote: R, store: S) -> Self {
        Self {
            local,
            remote,
            store,
        }
    }

    /// Performs a full bidirectional sync for all list mappings.
    pub async fn run(
        &self,
        cancel: &CancelToken,
        list_mappings: &BTreeMap<String, String>,
    ) -> PassReport {
        let mut report = PassReport::default();

        let list_names: Vec<String> = list_mappings.keys().cloned().collect();

        // 1. Fetch all Reminders items across configured lists in one batch.
        let local_items = match self.local.fetch_all(cancel, &list_names).await {
            Ok(items) => items,
            Err(err) => {
                report.first_error = Some(err);
                return report;
            }
        };
        let local_by_uid = index_by_uid(local_items);

        // 2. Process each list mapping independently.
        for (list_name, entity_id) in list_mappings {
            let list_report = self
                .reconcile_list(cancel, list_name, entity_id, &local_by_uid)
                .await;
            report.stats.merge(list_report.stats);
            if report.first_error.is_none() {
                report.first_error = list_report.first_error;
            }
        }

        tracing::info!(
            created = report.stats.created,
            updated = report.stats.updated,
            deleted = report.stats.deleted,
            conflicts = report.stats.conflicts,
            errors = report.stats.errors,
            "reconcile complete"
        );

        report
    }

    /// Performs reconciliation for a single HA entity. Called from the
    /// event-driven fast path when a state_changed event arrives.
    pub async fn reconcile_entity(
        &self,
        cancel: &CancelToken,
        list_name: &str,
        entity_id: &str,
    ) -> PassReport {
        let lists = [list_name.to_string()];
        let local_items = match self.local.fetch_all(cancel, &lists).await {
            Ok(items) => items,
            Err(err) => {
                return PassReport {
                    first_error: Some(err),
                    ..Default::default()
                };
            }
        };
        let local_by_uid = index_by_uid(local_items);

        self.reconcile_list(cancel, list_name, entity_id, &local_by_uid)
            .await
    }

    /// Bidirectional sync for a single list ↔ entity pair.
    async fn reconcile_list(
        &self,
        cancel: &CancelToken,
        list_name: &str,
        entity_id: &str,
        local_by_uid: &HashMap<String, Item>,
    ) -> PassReport {
        let mut report = PassReport::default();

        tracing::debug!(list = %list_name, entity = %entity_id, "reconciling list");

        let remote_items = match self.remote.get_items(cancel, entity_id).await {
            Ok(mut items) => {
                for item in &mut items {
                    item.list_name = list_name.to_string();
                }
                items
            }
            Err(err) => {
                report.first_error = Some(err);
                return report;
            }
        };
        let remote_by_uid = index_by_uid(remote_items);

        let rows = match self.store.get_all_for_list(cancel, list_name) {
            Ok(rows) => rows,
            Err(err) => {
                report.first_error = Some(err);
                return report;
            }
        };

        // Phase 1: items the ledger already tracks.
        let mut processed_local = HashMap::new();
        let mut processed_remote = HashMap::new();

        for mut row in rows {
            let local_item = local_by_uid.get(&row.local_uid);
            let remote_item = remote_by_uid.get(&row.remote_uid);

            if !row.local_uid.is_empty() {
                processed_local.insert(row.local_uid.clone(), true);
            }
            if !row.remote_uid.is_empty() {
                processed_remote.insert(row.remote_uid.clone(), true);
            }

            let action = decide(&row, local_item, remote_item);
            let old_hash = row.last_sync_hash.clone();

            if let Err(err) = self
                .execute(cancel, action, &mut row, local_item, remote_item, entity_id)
                .await
            {
                tracing::error!(
                    action = ?action,
                    title = %row.title,
                    error = %err,
                    "sync action failed"
                );
                report.record_error(err);
                continue;
            }

            match action {
                Action::None => {}
                Action::UpdateRemote | Action::UpdateLocal => {
                    report.stats.updated += 1;
                    // A conflict means both sides diverged from the baseline,
                    // whichever one won.
                    if let (Some(local), Some(remote)) = (local_item, remote_item) {
                        if local.content_hash() != old_hash && remote.content_hash() != old_hash {
                            report.stats.conflicts += 1;
                        }
                    }
                }
                Action::DeleteRemote | Action::DeleteLocal => {
                    report.stats.deleted += 1;
                }
            }
        }

        // Phase 2a: Reminders items the ledger does not know → create in HA.
        for (uid, local_item) in local_by_uid {
            if local_item.list_name != list_name || processed_local.contains_key(uid) {
                continue;
            }

            tracing::info!(title = %local_item.title, uid = %uid, "new reminder detected");
            if let Err(err) = self.create_in_remote(cancel, local_item, entity_id).await {
                tracing::error!(title = %local_item.title, error = %err, "failed to create in HA");
                report.record_error(err);
                continue;
            }
            report.stats.created += 1;
        }

        // Phase 2b: HA items the ledger does not know → create in Reminders.
        for (uid, remote_item) in &remote_by_uid {
            if processed_remote.contains_key(uid) {
                continue;
            }

            tracing::info!(title = %remote_item.title, uid = %uid, "new HA item detected");
            if let Err(err) = self.create_in_local(cancel, remote_item).await {
                tracing::error!(title = %remote_item.title, error = %err, "failed to create in Reminders");
                report.record_error(err);
                continue;
            }
            report.stats.created += 1;
        }

        report
    }

    /// Dispatches the decided action to the appropriate adapter and updates
    /// the ledger.
    async fn execute(
        &self,
        cancel: &CancelToken,
        action: Action,
        row: &mut LedgerRow,
        local_item: Option<&Item>,
        remote_item: Option<&Item>,
        entity_id: &str,
    ) -> crate::error::Result<()> {
        let now = Utc::now();

        match action {
            Action::None => Ok(()),

            Action::DeleteRemote => {
                if let Some(remote) = remote_item {
                    self.remote
                        .remove_item(cancel, entity_id, &remote.title)
                        .await?;
                }
                self.store.delete(cancel, row.id)
            }

            Action::DeleteLocal => {
                if let Some(local) = local_item {
                    self.local.delete(cancel, &local.uid).await?;
                }
                self.store.delete(cancel, row.id)
            }

            Action::UpdateRemote => {
                let Some(local) = local_item else {
                    return Ok(());
                };
                // Address the HA item by its current title, not the ledger
                // title, since a conflicting remote edit may have renamed it.
                let current_title = remote_item.map_or(row.title.as_str(), |r| r.title.as_str());
                self.remote
                    .update_item(cancel, entity_id, current_title, local)
                    .await?;
                row.title = local.title.clone();
                row.last_sync_hash = local.content_hash();
                row.local_modified = local.modified_at;
                row.last_synced_at = Some(now);
                self.store.upsert(cancel, row)
            }

            Action::UpdateLocal => {
                let Some(remote) = remote_item else {
                    return Ok(());
                };
                self.local.update(cancel, &row.local_uid, remote).await?;
                row.title = remote.title.clone();
                row.last_sync_hash = remote.content_hash();
                row.remote_modified = remote.modified_at;
                row.last_synced_at = Some(now);
                self.store.upsert(cancel, row)
            }
        }
    }

    /// Pushes a new Reminders item to HA and writes the ledger row. HA does
    /// not return the assigned UID, so the entity is refetched and the new
    /// item located by title.
    async fn create_in_remote(
        &self,
        cancel: &CancelToken,
        local_item: &Item,
        entity_id: &str,
    ) -> crate::error::Result<()> {
        self.remote.add_item(cancel, entity_id, local_item).await?;

        let remote_items = self.remote.get_items(cancel, entity_id).await?;
        let remote_uid = remote_items
            .iter()
            .find(|r| r.title == local_item.title)
            .map(|r| r.uid.clone())
            .unwrap_or_default();

        let mut row = LedgerRow {
            local_uid: local_item.uid.clone(),
            remote_uid,
            list_name: local_item.list_name.clone(),
            title: local_item.title.clone(),
            last_sync_hash: local_item.content_hash(),
            local_modified: local_item.modified_at,
            last_synced_at: Some(Utc::now()),
            ..Default::default()
        };
        self.store.upsert(cancel, &mut row)
    }

    /// Pushes a new HA item to Reminders and writes the ledger row.
    async fn create_in_local(
        &self,
        cancel: &CancelToken,
        remote_item: &Item,
    ) -> crate::error::Result<()> {
        let local_uid = self.local.create(cancel, remote_item).await?;

        let mut row = LedgerRow {
            local_uid,
            remote_uid: remote_item.uid.clone(),
            list_name: remote_item.list_name.clone(),
            title: remote_item.title.clone(),
            last_sync_hash: remote_item.content_hash(),
            remote_modified: remote_item.modified_at,
            last_synced_at: Some(Utc::now()),
            ..Default::default()
        };
        self.store.upsert(cancel, &mut row)
    }
}

/// Determines what to do with a tracked row based on presence, content
/// hashes, and (for conflicts) modification timestamps.
fn decide(row: &LedgerRow, local_item: Option<&Item>, remote_item: Option<&Item>) -> Action {
    let (local, remote) = match (local_item, remote_item) {
        // Both gone → the delete-remote path cleans up the ledger row only.
        (None, None) => return Action::DeleteRemote,
        (None, Some(_)) => return Action::DeleteRemote,
        (Some(_), None) => return Action::DeleteLocal,
        (Some(l), Some(r)) => (l, r),
    };

    let local_changed = local.content_hash() != row.last_sync_hash;
    let remote_changed = remote.content_hash() != row.last_sync_hash;

    match (local_changed, remote_changed) {
        (false, false) => Action::None,
        (true, false) => Action::UpdateRemote,
        (false, true) => Action::UpdateLocal,
        (true, true) => {
            // Both diverged from the baseline → last write wins. An absent
            // timestamp compares as the earliest instant, and ties favor
            // Reminders as the primary source.
            tracing::info!(
                title = %row.title,
                local_modified = ?local.modified_at,
                remote_modified = ?remote.modified_at,
                "conflict detected"
            );
            if modified_or_epoch(local.modified_at) >= modified_or_epoch(remote.modified_at) {
                Action::UpdateRemote
            } else {
                Action::UpdateLocal
            }
        }
    }
}

fn modified_or_epoch(t: Option<DateTime<Utc>>) -> DateTime<Utc> {
    t.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn index_by_uid(items: Vec<Item>) -> HashMap<String, Item> {
    items
        .into_iter()
        .map(|item| (item.uid.clone(), item))
        .collect()
}
