//! Normalized task model shared by the Reminders adapter, the Home Assistant
//! adapter, and the sync engine.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Priority level of a task.
///
/// Discriminants match Apple EventKit's canonical priority integers, so the
/// value that goes into the content hash is stable across both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// No priority set.
    #[default]
    None,
    /// High priority (EventKit 1-4).
    High,
    /// Medium priority (EventKit 5).
    Medium,
    /// Low priority (EventKit 6-9).
    Low,
}

impl Priority {
    /// Maps any EventKit priority integer (0-9) to one of the four canonical
    /// levels. Values outside 0-9 are treated as `None`.
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1..=4 => Self::High,
            5 => Self::Medium,
            6..=9 => Self::Low,
            _ => Self::None,
        }
    }

    /// The canonical EventKit integer for this level: 0, 1, 5, or 9.
    #[must_use]
    pub fn as_raw(self) -> i64 {
        match self {
            Self::None => 0,
            Self::High => 1,
            Self::Medium => 5,
            Self::Low => 9,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "None",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        write!(f, "{label}")
    }
}

/// Normalized representation of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Adapter-specific unique identifier (EventKit calendarItemIdentifier or
    /// HA todo item UID). Empty when not yet assigned.
    pub uid: String,

    /// Display title.
    pub title: String,

    /// Body text (Reminders "notes" / HA "description"). For HA items the
    /// priority prefix has already been stripped.
    pub description: String,

    /// When the task is due. `None` means no due date.
    pub due_date: Option<DateTime<Utc>>,

    /// Normalized priority level.
    pub priority: Priority,

    /// True when the task has been marked as done.
    pub completed: bool,

    /// Last modification time reported by the source adapter. Used only for
    /// last-write-wins conflict resolution, never change detection. HA's
    /// get_items response carries no modification time, so remote items leave
    /// this as `None`.
    pub modified_at: Option<DateTime<Utc>>,

    /// The Apple Reminders list this item belongs to. Used to look up the
    /// corresponding HA entity in the config mapping.
    pub list_name: String,
}

impl Item {
    /// Deterministic SHA-256 hex digest of the fields that matter for change
    /// detection: title, description, due date, priority, and completed
    /// status. `modified_at` is intentionally excluded since it changes on
    /// every save, and `uid` is excluded because it differs between the two
    /// sides.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"|");
        hasher.update(self.description.as_bytes());
        hasher.update(b"|");
        if let Some(due) = self.due_date {
            hasher.update(
                due.to_rfc3339_opts(SecondsFormat::Secs, true)
                    .as_bytes(),
            );
        }
        hasher.update(b"|");
        hasher.update(self.priority.as_raw().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(if self.completed { b"true" as &[u8] } else { b"false" });
        format!("{:x}", hasher.finalize())
    }
}

// --- Priority prefix encoding for Home Assistant descriptions ---------------

const PREFIX_HIGH: &str = "[High] ";
const PREFIX_MEDIUM: &str = "[Medium] ";
const PREFIX_LOW: &str = "[Low] ";

/// Prepends the priority tag to a description string for storage in Home
/// Assistant (which has no native priority field).
#[must_use]
pub fn encode_priority_prefix(priority: Priority, description: &str) -> String {
    match priority {
        Priority::High => format!("{PREFIX_HIGH}{description}"),
        Priority::Medium => format!("{PREFIX_MEDIUM}{description}"),
        Priority::Low => format!("{PREFIX_LOW}{description}"),
        Priority::None => description.to_string(),
    }
}

/// Strips the priority tag from an HA description and returns the priority
/// and the clean description text. Only an exact prefix match (including the
/// trailing space) is stripped; anything else belongs to the description.
#[must_use]
pub fn decode_priority_prefix(description: &str) -> (Priority, String) {
    if let Some(rest) = description.strip_prefix(PREFIX_HIGH) {
        (Priority::High, rest.to_string())
    } else if let Some(rest) = description.strip_prefix(PREFIX_MEDIUM) {
        (Priority::Medium, rest.to_string())
    } else if let Some(rest) = description.strip_prefix(PREFIX_LOW) {
        (Priority::Low, rest.to_string())
    } else {
        (Priority::None, description.to_string())
    }
}
