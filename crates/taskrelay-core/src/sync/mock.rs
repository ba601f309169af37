//! In-memory mock adapters and ledger store for reconciler, bootstrap, and
//! engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::db::LedgerStore;
use crate::error::{Error, Result};
use crate::models::{Item, LedgerRow};

use super::{EventSource, LocalSource, RemoteSource};

// --- Mock Reminders source ---------------------------------------------------

pub(crate) struct MockLocal {
    items: Mutex<HashMap<String, Item>>,
    next_uid: Mutex<u32>,
}

impl MockLocal {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            next_uid: Mutex::new(0),
        }
    }

    pub(crate) fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mock = Self::new();
        {
            let mut map = mock.items.lock().unwrap();
            for item in items {
                map.insert(item.uid.clone(), item);
            }
            *mock.next_uid.lock().unwrap() = map.len() as u32;
        }
        mock
    }

    pub(crate) fn get(&self, uid: &str) -> Option<Item> {
        self.items.lock().unwrap().get(uid).cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[async_trait]
impl LocalSource for MockLocal {
    async fn fetch_all(&self, _cancel: &CancelToken, list_names: &[String]) -> Result<Vec<Item>> {
        let items = self.items.lock().unwrap();
        Ok(items
            .values()
            .filter(|item| list_names.contains(&item.list_name))
            .cloned()
            .collect())
    }

    async fn create(&self, _cancel: &CancelToken, item: &Item) -> Result<String> {
        let mut next = self.next_uid.lock().unwrap();
        *next += 1;
        let uid = format!("rem-{next}");
        let mut created = item.clone();
        created.uid = uid.clone();
        self.items.lock().unwrap().insert(uid.clone(), created);
        Ok(uid)
    }

    async fn update(&self, _cancel: &CancelToken, uid: &str, item: &Item) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let existing = items
            .get_mut(uid)
            .ok_or_else(|| Error::Backend(format!("reminder {uid:?} not found")))?;
        existing.title = item.title.clone();
        existing.description = item.description.clone();
        existing.due_date = item.due_date;
        existing.priority = item.priority;
        existing.completed = item.completed;
        existing.modified_at = item.modified_at;
        Ok(())
    }

    async fn delete(&self, _cancel: &CancelToken, uid: &str) -> Result<()> {
        self.items
            .lock()
            .unwrap()
            .remove(uid)
            .map(drop)
            .ok_or_else(|| Error::Backend(format!("reminder {uid:?} not found")))
    }
}

// --- Mock HA source ----------------------------------------------------------

pub(crate) struct MockRemote {
    items: Mutex<HashMap<String, Vec<Item>>>,
    next_uid: Mutex<u32>,
    fail_add_title: Mutex<Option<String>>,
}

impl MockRemote {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            next_uid: Mutex::new(100),
            fail_add_title: Mutex::new(None),
        }
    }

    /// Seeds an item without going through `add_item` (no UID rewriting).
    pub(crate) fn add(&self, entity_id: &str, item: Item) {
        self.items
            .lock()
            .unwrap()
            .entry(entity_id.to_string())
            .or_default()
            .push(item);
    }

    /// Makes `add_item` fail for one specific title.
    pub(crate) fn fail_add_item_titled(&self, title: &str) {
        *self.fail_add_title.lock().unwrap() = Some(title.to_string());
    }

    pub(crate) fn items(&self, entity_id: &str) -> Vec<Item> {
        self.items
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteSource for MockRemote {
    async fn get_items(&self, _cancel: &CancelToken, entity_id: &str) -> Result<Vec<Item>> {
        Ok(self.items(entity_id))
    }

    async fn add_item(&self, _cancel: &CancelToken, entity_id: &str, item: &Item) -> Result<()> {
        if self.fail_add_title.lock().unwrap().as_deref() == Some(item.title.as_str()) {
            return Err(Error::Remote("simulated add_item failure".into()));
        }
        let mut next = self.next_uid.lock().unwrap();
        *next += 1;
        let mut created = item.clone();
        created.uid = format!("ha-{next}");
        self.items
            .lock()
            .unwrap()
            .entry(entity_id.to_string())
            .or_default()
            .push(created);
        Ok(())
    }

    async fn update_item(
        &self,
        _cancel: &CancelToken,
        entity_id: &str,
        current_title: &str,
        item: &Item,
    ) -> Result<()> {
        let mut all = self.items.lock().unwrap();
        let items = all.entry(entity_id.to_string()).or_default();
        let existing = items
            .iter_mut()
            .find(|h| h.title == current_title)
            .ok_or_else(|| {
                Error::Remote(format!("item {current_title:?} not found in {entity_id}"))
            })?;
        existing.title = item.title.clone();
        existing.description = item.description.clone();
        existing.due_date = item.due_date;
        existing.priority = item.priority;
        existing.completed = item.completed;
        existing.modified_at = item.modified_at;
        Ok(())
    }

    async fn remove_item(&self, _cancel: &CancelToken, entity_id: &str, title: &str) -> Result<()> {
        let mut all = self.items.lock().unwrap();
        let items = all.entry(entity_id.to_string()).or_default();
        let before = items.len();
        items.retain(|h| h.title != title);
        if items.len() == before {
            return Err(Error::Remote(format!(
                "item {title:?} not found in {entity_id}"
            )));
        }
        Ok(())
    }
}

// --- Mock event source -------------------------------------------------------

/// Event source whose `connect` outcome is fixed up front. When connected,
/// `subscribe` emits the queued entity ids once, then waits for cancellation.
pub(crate) struct MockEvents {
    pub(crate) connectable: bool,
    pub(crate) pending: Vec<String>,
}

#[async_trait]
impl EventSource for MockEvents {
    async fn connect(&self) -> Result<()> {
        if self.connectable {
            Ok(())
        } else {
            Err(Error::Remote("simulated connect failure".into()))
        }
    }

    async fn subscribe(
        &self,
        cancel: CancelToken,
        _entity_ids: Vec<String>,
        events: mpsc::Sender<String>,
    ) -> Result<()> {
        for id in &self.pending {
            if events.send(id.clone()).await.is_err() {
                return Ok(());
            }
        }
        cancel.cancelled().await;
        Err(Error::Cancelled)
    }
}

// --- Mock ledger store -------------------------------------------------------

pub(crate) struct MockStore {
    rows: Mutex<HashMap<i64, LedgerRow>>,
    next_id: Mutex<i64>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    pub(crate) fn seed(&self, mut row: LedgerRow) {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        row.id = *next;
        self.rows.lock().unwrap().insert(row.id, row);
    }

    pub(crate) fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub(crate) fn all(&self) -> Vec<LedgerRow> {
        let mut rows: Vec<LedgerRow> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

impl LedgerStore for MockStore {
    fn get_by_local_uid(&self, _cancel: &CancelToken, uid: &str) -> Result<Option<LedgerRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.local_uid == uid)
            .cloned())
    }

    fn get_by_remote_uid(&self, _cancel: &CancelToken, uid: &str) -> Result<Option<LedgerRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.remote_uid == uid)
            .cloned())
    }

    fn get_all_for_list(&self, _cancel: &CancelToken, list_name: &str) -> Result<Vec<LedgerRow>> {
        let mut rows: Vec<LedgerRow> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.list_name == list_name)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    fn upsert(&self, _cancel: &CancelToken, row: &mut LedgerRow) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if row.id == 0 {
            let existing = rows
                .values()
                .find(|r| {
                    (!row.local_uid.is_empty() && r.local_uid == row.local_uid)
                        || (row.local_uid.is_empty()
                            && !row.remote_uid.is_empty()
                            && r.remote_uid == row.remote_uid)
                })
                .map(|r| r.id);
            match existing {
                Some(id) => row.id = id,
                None => {
                    let mut next = self.next_id.lock().unwrap();
                    *next += 1;
                    row.id = *next;
                }
            }
        }
        rows.insert(row.id, row.clone());
        Ok(())
    }

    fn delete(&self, _cancel: &CancelToken, id: i64) -> Result<()> {
        self.rows.lock().unwrap().remove(&id);
        Ok(())
    }

    fn is_empty(&self, _cancel: &CancelToken) -> Result<bool> {
        Ok(self.rows.lock().unwrap().is_empty())
    }
}
