//! Apple Reminders adapter.
//!
//! Wraps a platform [`RemindersBackend`] (EventKit on macOS) and converts
//! between its record types and the shared [`Item`] representation. The
//! adapter exposes only the operations the sync engine needs; the backend
//! itself lives outside this crate and is injected, which also makes mock
//! backends trivial in tests.

mod convert;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::models::Item;
use crate::sync::LocalSource;

pub use convert::{item_to_create_input, item_to_update_input, reminder_to_item};

/// A single reminder as reported by the platform backend.
///
/// `priority` carries the raw EventKit 0-9 integer; normalization happens in
/// the conversion layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendReminder {
    pub id: String,
    pub title: String,
    pub notes: String,
    pub list: String,
    pub priority: i64,
    pub completed: bool,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Fields for creating a reminder. The backend always creates an incomplete
/// reminder; completion is a separate call.
#[derive(Debug, Clone, Default)]
pub struct CreateReminderInput {
    pub title: String,
    pub notes: String,
    pub list_name: String,
    pub priority: i64,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
}

/// Fields for updating a reminder. All syncable fields are set so the update
/// is a full overwrite. `clear_due_date` distinguishes "remove the due date"
/// from "leave it alone" when `due_date` is `None`.
#[derive(Debug, Clone, Default)]
pub struct UpdateReminderInput {
    pub title: String,
    pub notes: String,
    pub priority: i64,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub clear_due_date: bool,
}

/// Platform SDK façade the adapter drives. Implemented by the CLI's
/// osascript backend in production and by in-memory mocks in tests.
///
/// Implementations signal a platform privacy denial with
/// [`Error::AccessDenied`] so the caller can prompt the user and retry.
pub trait RemindersBackend: Send + Sync {
    /// All reminders in the named list, completed ones included.
    fn reminders(&self, list_name: &str) -> Result<Vec<BackendReminder>>;

    /// Create a reminder and return it with its assigned identifier.
    fn create_reminder(&self, input: &CreateReminderInput) -> Result<BackendReminder>;

    /// Apply a full-field update and return the resulting reminder.
    fn update_reminder(&self, id: &str, input: &UpdateReminderInput) -> Result<BackendReminder>;

    /// Permanently remove a reminder.
    fn delete_reminder(&self, id: &str) -> Result<()>;

    /// Mark a reminder completed (sets the completion date).
    fn complete_reminder(&self, id: &str) -> Result<()>;

    /// Mark a reminder incomplete (clears the completion date).
    fn uncomplete_reminder(&self, id: &str) -> Result<()>;
}

/// Sync-engine-facing adapter over a [`RemindersBackend`].
pub struct RemindersAdapter<B> {
    backend: B,
}

impl<B: RemindersBackend> RemindersAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: RemindersBackend> LocalSource for RemindersAdapter<B> {
    async fn fetch_all(&self, cancel: &CancelToken, list_names: &[String]) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for name in list_names {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tracing::debug!(list = %name, "fetching reminders");
            let reminders = self.backend.reminders(name)?;
            tracing::debug!(list = %name, count = reminders.len(), "fetched reminders");
            items.extend(reminders.iter().map(|r| reminder_to_item(r, name)));
        }
        Ok(items)
    }

    async fn create(&self, cancel: &CancelToken, item: &Item) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(title = %item.title, list = %item.list_name, "creating reminder");

        let created = self.backend.create_reminder(&item_to_create_input(item))?;

        // The backend only creates incomplete reminders; mark the new one
        // completed in a follow-up step when needed.
        if item.completed {
            self.backend.complete_reminder(&created.id)?;
        }

        Ok(created.id)
    }

    async fn update(&self, cancel: &CancelToken, uid: &str, item: &Item) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(uid = %uid, title = %item.title, "updating reminder");

        let updated = self.backend.update_reminder(uid, &item_to_update_input(item))?;

        // Completion toggling goes through the dedicated capability so the
        // completion date is set or cleared properly.
        if item.completed && !updated.completed {
            self.backend.complete_reminder(uid)?;
        } else if !item.completed && updated.completed {
            self.backend.uncomplete_reminder(uid)?;
        }

        Ok(())
    }

    async fn delete(&self, cancel: &CancelToken, uid: &str) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(uid = %uid, "deleting reminder");
        self.backend.delete_reminder(uid)
    }
}
