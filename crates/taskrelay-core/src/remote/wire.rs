//! Home Assistant todo service wire types and payload builders.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{decode_priority_prefix, encode_priority_prefix, Item};

pub(crate) const DOMAIN_TODO: &str = "todo";
pub(crate) const SERVICE_GET_ITEMS: &str = "get_items";
pub(crate) const SERVICE_ADD_ITEM: &str = "add_item";
pub(crate) const SERVICE_UPDATE_ITEM: &str = "update_item";
pub(crate) const SERVICE_REMOVE_ITEM: &str = "remove_item";

pub(crate) const STATUS_NEEDS_ACTION: &str = "needs_action";
pub(crate) const STATUS_COMPLETED: &str = "completed";

const DATE_LAYOUT: &str = "%Y-%m-%d";

/// A single item as returned by `todo.get_items`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RemoteTodoItem {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub summary: String,
    /// "needs_action" or "completed"
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    /// "YYYY-MM-DD" or RFC 3339
    #[serde(default)]
    pub due: String,
}

/// The per-entity wrapper inside the service response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct EntityItems {
    #[serde(default)]
    pub items: Vec<RemoteTodoItem>,
}

/// Response body of a service call made with `?return_response`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServiceCallResponse {
    #[serde(default)]
    pub service_response: HashMap<String, EntityItems>,
}

/// Converts an HA todo item to a normalized [`Item`]. The priority prefix
/// (e.g. "[High] ") is stripped from the description and decoded into the
/// priority field. HA reports no modification time, so `modified_at` stays
/// `None`.
pub(crate) fn remote_item_to_model(h: &RemoteTodoItem) -> Item {
    let (priority, description) = decode_priority_prefix(&h.description);

    Item {
        uid: h.uid.clone(),
        title: h.summary.clone(),
        description,
        due_date: parse_due(&h.due),
        priority,
        completed: h.status == STATUS_COMPLETED,
        modified_at: None,
        list_name: String::new(),
    }
}

/// Service-call payload for `todo.get_items`.
pub(crate) fn build_get_items_data(entity_id: &str) -> Value {
    json!({ "entity_id": entity_id })
}

/// Service-call payload for `todo.add_item`.
pub(crate) fn build_add_item_data(entity_id: &str, item: &Item) -> Value {
    let mut data = json!({
        "entity_id": entity_id,
        "item": item.title,
    });

    let desc = encode_priority_prefix(item.priority, &item.description);
    if !desc.is_empty() {
        data["description"] = Value::String(desc);
    }

    if let Some(due) = item.due_date {
        data["due_date"] = Value::String(format_due(due));
    }

    data
}

/// Service-call payload for `todo.update_item`. `current_title` is the
/// item's title as it currently exists in HA, used to identify the target; a
/// changed title travels in the `rename` field. A cleared due date is
/// expressed by omitting `due_date` entirely.
pub(crate) fn build_update_item_data(entity_id: &str, current_title: &str, item: &Item) -> Value {
    let mut data = json!({
        "entity_id": entity_id,
        "item": current_title,
    });

    if item.title != current_title {
        data["rename"] = Value::String(item.title.clone());
    }

    data["description"] = Value::String(encode_priority_prefix(item.priority, &item.description));

    if let Some(due) = item.due_date {
        data["due_date"] = Value::String(format_due(due));
    }

    data["status"] = Value::String(
        if item.completed {
            STATUS_COMPLETED
        } else {
            STATUS_NEEDS_ACTION
        }
        .to_string(),
    );

    data
}

/// Service-call payload for `todo.remove_item`.
pub(crate) fn build_remove_item_data(entity_id: &str, title: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "item": title,
    })
}

/// Parses an HA due-date string: date-only format first, then RFC 3339.
/// Unparseable input is treated as "no due date".
pub(crate) fn parse_due(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_LAYOUT) {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Formats a due date as HA's date-only string.
pub(crate) fn format_due(t: DateTime<Utc>) -> String {
    t.format(DATE_LAYOUT).to_string()
}
