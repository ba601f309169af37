//! Conversion between backend reminder records and the shared item model.

use crate::models::{Item, Priority};

use super::{BackendReminder, CreateReminderInput, UpdateReminderInput};

/// Converts a backend reminder to a normalized [`Item`]. `list_name` is
/// passed explicitly because the backend's reported list name may differ
/// from the config mapping key in edge cases (stray whitespace).
#[must_use]
pub fn reminder_to_item(r: &BackendReminder, list_name: &str) -> Item {
    Item {
        uid: r.id.clone(),
        title: r.title.clone(),
        description: r.notes.clone(),
        due_date: r.due_date,
        priority: Priority::from_raw(r.priority),
        completed: r.completed,
        modified_at: r.modified_at,
        list_name: list_name.to_string(),
    }
}

/// Builds a backend create input from an [`Item`].
#[must_use]
pub fn item_to_create_input(item: &Item) -> CreateReminderInput {
    CreateReminderInput {
        title: item.title.clone(),
        notes: item.description.clone(),
        list_name: item.list_name.clone(),
        priority: item.priority.as_raw(),
        due_date: item.due_date,
    }
}

/// Builds a backend update input from an [`Item`]. All syncable fields are
/// set so the update overwrites rather than patches, matching the engine's
/// winner-takes-all semantics. Completion is handled separately by the
/// adapter through the dedicated complete/uncomplete capability.
#[must_use]
pub fn item_to_update_input(item: &Item) -> UpdateReminderInput {
    UpdateReminderInput {
        title: item.title.clone(),
        notes: item.description.clone(),
        priority: item.priority.as_raw(),
        due_date: item.due_date,
        clear_due_date: item.due_date.is_none(),
    }
}
