//! Bidirectional reconciliation engine.
//!
//! Compares Apple Reminders items and Home Assistant todo items against the
//! sync ledger, detects creates, updates, deletes, and conflicts, and
//! dispatches mutations to the appropriate adapter.
//!
//! The module contains three main components:
//!
//! - [`Reconciler`] computes and executes a single sync pass.
//! - [`Engine`] runs the polling loop and optional WebSocket listener.
//! - [`Bootstrap`] handles first-run title-matching to link existing items
//!   on both sides.

mod bootstrap;
mod engine;
#[cfg(test)]
mod mock;
mod reconciler;

pub use bootstrap::Bootstrap;
pub use engine::{Engine, SyncTotals, TotalsSnapshot};
pub use reconciler::{PassReport, Reconciler, SyncStats};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::models::Item;

/// Read/write access to Apple Reminders items.
/// Implemented by [`RemindersAdapter`](crate::local::RemindersAdapter).
#[async_trait]
pub trait LocalSource: Send + Sync {
    /// All items (completed and incomplete) across the given lists, each
    /// tagged with its list name.
    async fn fetch_all(&self, cancel: &CancelToken, list_names: &[String]) -> Result<Vec<Item>>;

    /// Create an item and return the UID the platform assigned.
    async fn create(&self, cancel: &CancelToken, item: &Item) -> Result<String>;

    /// Overwrite all syncable fields of the item with the given UID.
    async fn update(&self, cancel: &CancelToken, uid: &str, item: &Item) -> Result<()>;

    /// Permanently remove the item with the given UID.
    async fn delete(&self, cancel: &CancelToken, uid: &str) -> Result<()>;
}

/// Read/write access to Home Assistant todo items.
/// Implemented by [`HomeAssistantAdapter`](crate::remote::HomeAssistantAdapter).
///
/// Mutations address items by their *current* title: HA's todo services have
/// no UID parameter. `add_item` returns no UID either; callers refetch and
/// match by title to learn it.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn get_items(&self, cancel: &CancelToken, entity_id: &str) -> Result<Vec<Item>>;

    async fn add_item(&self, cancel: &CancelToken, entity_id: &str, item: &Item) -> Result<()>;

    async fn update_item(
        &self,
        cancel: &CancelToken,
        entity_id: &str,
        current_title: &str,
        item: &Item,
    ) -> Result<()>;

    async fn remove_item(&self, cancel: &CancelToken, entity_id: &str, title: &str) -> Result<()>;
}

/// Push-channel of entity-change notifications, the event-driven fast path.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Probes the event channel once (connect + authenticate). The engine
    /// downgrades to polling-only when this fails.
    async fn connect(&self) -> Result<()>;

    /// Streams changed entity ids into `events` until cancelled,
    /// reconnecting on transport failure without an attempt bound.
    async fn subscribe(
        &self,
        cancel: CancelToken,
        entity_ids: Vec<String>,
        events: mpsc::Sender<String>,
    ) -> Result<()>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for std::sync::Arc<T> {
    async fn connect(&self) -> Result<()> {
        (**self).connect().await
    }

    async fn subscribe(
        &self,
        cancel: CancelToken,
        entity_ids: Vec<String>,
        events: mpsc::Sender<String>,
    ) -> Result<()> {
        (**self).subscribe(cancel, entity_ids, events).await
    }
}
