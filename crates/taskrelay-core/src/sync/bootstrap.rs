//! First-run linkage of pre-existing items.
//!
//! When the ledger is empty, existing items on both sides are matched by
//! case-insensitive title, a summary is printed, and only after explicit
//! confirmation are ledger rows written and single-sided items pushed
//! across.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};

use chrono::Utc;

use crate::cancel::CancelToken;
use crate::db::LedgerStore;
use crate::error::Result;
use crate::models::{Item, LedgerRow};

use super::{LocalSource, RemoteSource};

/// First-run linkage between Apple Reminders and Home Assistant.
pub struct Bootstrap<'a, L, R, S, In, Out> {
    local: &'a L,
    remote: &'a R,
    store: &'a S,
    /// Confirmation prompt input (stdin in production).
    reader: In,
    /// Summary output (stdout in production).
    writer: Out,
}

/// Title-match result for a single list mapping.
struct MatchResult {
    list_name: String,
    entity_id: String,
    matched: Vec<(Item, Item)>,
    local_only: Vec<Item>,
    remote_only: Vec<Item>,
}

impl<'a, L, R, S, In, Out> Bootstrap<'a, L, R, S, In, Out>
where
    L: LocalSource,
    R: RemoteSource,
    S: LedgerStore,
    In: BufRead,
    Out: Write,
{
    /// Creates a bootstrap wired to the given adapters and ledger store.
    /// `reader` and `writer` carry the confirmation prompt I/O.
    pub fn new(local: &'a L, remote: &'a R, store: &'a S, reader: In, writer: Out) -> Self {
        Self {
            local,
            remote,
            store,
            reader,
            writer,
        }
    }

    /// Checks whether the ledger is empty and, if so, performs the first-run
    /// bootstrap. Returns true if the bootstrap executed, false if skipped
    /// or declined.
    pub async fn run(
        &mut self,
        cancel: &CancelToken,
        list_mappings: &BTreeMap<String, String>,
    ) -> Result<bool> {
        if !self.store.is_empty(cancel)? {
            tracing::debug!("ledger is not empty, skipping bootstrap");
            return Ok(false);
        }

        tracing::info!("empty ledger detected, starting first-run bootstrap");

        let list_names: Vec<String> = list_mappings.keys().cloned().collect();
        let local_items = self.local.fetch_all(cancel, &list_names).await?;

        let mut local_by_list: HashMap<&str, Vec<&Item>> = HashMap::new();
        for item in &local_items {
            local_by_list.entry(&item.list_name).or_default().push(item);
        }

        let mut results = Vec::new();
        for (list_name, entity_id) in list_mappings {
            let mut remote_items = self.remote.get_items(cancel, entity_id).await?;
            for item in &mut remote_items {
                item.list_name = list_name.clone();
            }

            results.push(match_by_title(
                list_name,
                entity_id,
                local_by_list.get(list_name.as_str()).map_or(&[][..], Vec::as_slice),
                remote_items,
            ));
        }

        self.print_summary(&results)?;

        if !self.confirm()? {
            tracing::info!("bootstrap cancelled by user");
            return Ok(false);
        }

        self.execute(cancel, &results).await?;

        tracing::info!("bootstrap complete");
        Ok(true)
    }

    /// Writes a human-readable summary of the match results.
    fn print_summary(&mut self, results: &[MatchResult]) -> Result<()> {
        let total_matched: usize = results.iter().map(|r| r.matched.len()).sum();
        let total_local: usize = results.iter().map(|r| r.local_only.len()).sum();
        let total_remote: usize = results.iter().map(|r| r.remote_only.len()).sum();

        writeln!(self.writer, "\n--- First-Run Bootstrap Summary ---\n")?;

        for r in results {
            writeln!(self.writer, "List {:?} ↔ {}:", r.list_name, r.entity_id)?;
            writeln!(self.writer, "  Matched by title: {}", r.matched.len())?;
            for (local, _) in &r.matched {
                writeln!(self.writer, "    ✓ {}", local.title)?;
            }
            if !r.local_only.is_empty() {
                writeln!(
                    self.writer,
                    "  Only in Reminders (will push to HA): {}",
                    r.local_only.len()
                )?;
                for item in &r.local_only {
                    writeln!(self.writer, "    → {}", item.title)?;
                }
            }
            if !r.remote_only.is_empty() {
                writeln!(
                    self.writer,
                    "  Only in HA (will push to Reminders): {}",
                    r.remote_only.len()
                )?;
                for item in &r.remote_only {
                    writeln!(self.writer, "    ← {}", item.title)?;
                }
            }
            writeln!(self.writer)?;
        }

        writeln!(
            self.writer,
            "Total: {total_matched} matched, {total_local} Reminders→HA, {total_remote} HA→Reminders"
        )?;
        Ok(())
    }

    /// Reads a y/n response. A non-interactive reader (immediate EOF) counts
    /// as "no" so the bootstrap never proceeds unconfirmed.
    fn confirm(&mut self) -> Result<bool> {
        write!(self.writer, "Proceed with sync? [y/N] ")?;
        self.writer.flush()?;

        let mut answer = String::new();
        if self.reader.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        let answer = answer.trim().to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }

    /// Writes all matched pairs to the ledger and pushes unmatched items to
    /// the side that is missing them.
    async fn execute(&mut self, cancel: &CancelToken, results: &[MatchResult]) -> Result<()> {
        let now = Utc::now();

        for r in results {
            for (local, remote) in &r.matched {
                let mut row = LedgerRow {
                    local_uid: local.uid.clone(),
                    remote_uid: remote.uid.clone(),
                    list_name: r.list_name.clone(),
                    title: local.title.clone(),
                    last_sync_hash: local.content_hash(),
                    local_modified: local.modified_at,
                    remote_modified: remote.modified_at,
                    last_synced_at: Some(now),
                    ..Default::default()
                };
                self.store.upsert(cancel, &mut row)?;
                tracing::debug!(title = %local.title, "linked matched pair");
            }

            for item in &r.local_only {
                self.remote.add_item(cancel, &r.entity_id, item).await?;

                // Refetch to learn the assigned HA UID.
                let remote_items = self.remote.get_items(cancel, &r.entity_id).await?;
                let remote_uid = remote_items
                    .iter()
                    .find(|h| h.title == item.title)
                    .map(|h| h.uid.clone())
                    .unwrap_or_default();

                let mut row = LedgerRow {
                    local_uid: item.uid.clone(),
                    remote_uid,
                    list_name: r.list_name.clone(),
                    title: item.title.clone(),
                    last_sync_hash: item.content_hash(),
                    local_modified: item.modified_at,
                    last_synced_at: Some(now),
                    ..Default::default()
                };
                self.store.upsert(cancel, &mut row)?;
                tracing::info!(title = %item.title, "pushed to HA");
            }

            for item in &r.remote_only {
                let local_uid = self.local.create(cancel, item).await?;

                let mut row = LedgerRow {
                    local_uid,
                    remote_uid: item.uid.clone(),
                    list_name: r.list_name.clone(),
                    title: item.title.clone(),
                    last_sync_hash: item.content_hash(),
                    remote_modified: item.modified_at,
                    last_synced_at: Some(now),
                    ..Default::default()
                };
                self.store.upsert(cancel, &mut row)?;
                tracing::info!(title = %item.title, "pushed to Reminders");
            }
        }

        Ok(())
    }
}

/// Matches Reminders items to HA items by exact title, case-insensitively.
/// Each title matches at most one pair; unmatched items stay single-sided.
fn match_by_title(
    list_name: &str,
    entity_id: &str,
    local_items: &[&Item],
    remote_items: Vec<Item>,
) -> MatchResult {
    let mut remote_by_title: HashMap<String, Item> = remote_items
        .into_iter()
        .map(|item| (item.title.to_lowercase(), item))
        .collect();

    let mut matched = Vec::new();
    let mut local_only = Vec::new();

    for local in local_items {
        match remote_by_title.remove(&local.title.to_lowercase()) {
            Some(remote) => matched.push(((*local).clone(), remote)),
            None => local_only.push((*local).clone()),
        }
    }

    let mut remote_only: Vec<Item> = remote_by_title.into_values().collect();
    remote_only.sort_by(|a, b| a.title.cmp(&b.title));

    MatchResult {
        list_name: list_name.to_string(),
        entity_id: entity_id.to_string(),
        matched,
        local_only,
        remote_only,
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::{MockLocal, MockRemote, MockStore};
    use super::*;
    use crate::models::Priority;

    fn mappings() -> BTreeMap<String, String> {
        BTreeMap::from([("Shopping".to_string(), "todo.shopping".to_string())])
    }

    fn item(uid: &str, title: &str, list_name: &str) -> Item {
        Item {
            uid: uid.into(),
            title: title.into(),
            list_name: list_name.into(),
            priority: Priority::None,
            modified_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn matches_titles_case_insensitively() {
        let local = MockLocal::with_items([item("rem-1", "Buy Milk", "Shopping")]);
        let remote = MockRemote::new();
        remote.add("todo.shopping", item("ha-1", "buy milk", ""));
        let store = MockStore::new();
        let cancel = CancelToken::never();

        let mut output = Vec::new();
        let mut bootstrap =
            Bootstrap::new(&local, &remote, &store, &b"y\n"[..], &mut output);
        let ran = bootstrap.run(&cancel, &mappings()).await.unwrap();

        assert!(ran);
        assert_eq!(store.count(), 1);
        let rows = store.all();
        assert_eq!(rows[0].local_uid, "rem-1");
        assert_eq!(rows[0].remote_uid, "ha-1");
        // No new items created on either side.
        assert_eq!(local.count(), 1);
        assert_eq!(remote.items("todo.shopping").len(), 1);

        let summary = String::from_utf8(output).unwrap();
        assert!(summary.contains("Matched by title: 1"));
    }

    #[tokio::test]
    async fn declined_confirmation_aborts_without_mutation() {
        let local = MockLocal::with_items([item("rem-1", "Buy milk", "Shopping")]);
        let remote = MockRemote::new();
        let store = MockStore::new();
        let cancel = CancelToken::never();

        let mut output = Vec::new();
        let mut bootstrap =
            Bootstrap::new(&local, &remote, &store, &b"n\n"[..], &mut output);
        let ran = bootstrap.run(&cancel, &mappings()).await.unwrap();

        assert!(!ran);
        assert_eq!(store.count(), 0);
        assert!(remote.items("todo.shopping").is_empty());
    }

    #[tokio::test]
    async fn non_interactive_reader_aborts() {
        let local = MockLocal::with_items([item("rem-1", "Buy milk", "Shopping")]);
        let remote = MockRemote::new();
        let store = MockStore::new();
        let cancel = CancelToken::never();

        let mut output = Vec::new();
        let mut bootstrap = Bootstrap::new(&local, &remote, &store, &b""[..], &mut output);
        let ran = bootstrap.run(&cancel, &mappings()).await.unwrap();

        assert!(!ran);
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn skips_when_ledger_is_not_empty() {
        let local = MockLocal::new();
        let remote = MockRemote::new();
        let store = MockStore::new();
        store.seed(LedgerRow {
            local_uid: "rem-1".into(),
            list_name: "Shopping".into(),
            ..Default::default()
        });
        let cancel = CancelToken::never();

        let mut output = Vec::new();
        let mut bootstrap =
            Bootstrap::new(&local, &remote, &store, &b"y\n"[..], &mut output);
        let ran = bootstrap.run(&cancel, &mappings()).await.unwrap();

        assert!(!ran);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn pushes_single_sided_items_both_ways() {
        let local = MockLocal::with_items([item("rem-1", "Local only", "Shopping")]);
        let remote = MockRemote::new();
        remote.add("todo.shopping", item("ha-1", "Remote only", ""));
        let store = MockStore::new();
        let cancel = CancelToken::never();

        let mut output = Vec::new();
        let mut bootstrap =
            Bootstrap::new(&local, &remote, &store, &b"yes\n"[..], &mut output);
        let ran = bootstrap.run(&cancel, &mappings()).await.unwrap();

        assert!(ran);
        assert_eq!(store.count(), 2);

        // Local-only pushed to HA and linked to the refetched UID.
        let remote_items = remote.items("todo.shopping");
        assert_eq!(remote_items.len(), 2);
        let pushed = store
            .all()
            .into_iter()
            .find(|r| r.local_uid == "rem-1")
            .unwrap();
        assert!(!pushed.remote_uid.is_empty());

        // Remote-only pulled into Reminders with the returned local UID.
        let pulled = store
            .all()
            .into_iter()
            .find(|r| r.remote_uid == "ha-1")
            .unwrap();
        assert!(!pulled.local_uid.is_empty());
        assert_eq!(local.count(), 2);

        let summary = String::from_utf8(output).unwrap();
        assert!(summary.contains("Only in Reminders"));
        assert!(summary.contains("Only in HA"));
    }
}
