//! Apple Reminders backend driven through `osascript` (JXA).
//!
//! Each operation shells out to `osascript -l JavaScript` with a small
//! script that talks to the Reminders app and prints JSON on stdout.
//! Arguments travel through `argv`, never string interpolation. The first
//! call triggers the macOS automation consent prompt; a denial surfaces as
//! an access-denied error the caller can recover from.

use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use taskrelay_core::error::{Error, Result};
use taskrelay_core::local::{
    BackendReminder, CreateReminderInput, RemindersBackend, UpdateReminderInput,
};

const LIST_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Reminders");
  const list = app.lists.byName(argv[0]);
  const out = list.reminders().map(function (r) {
    return {
      id: r.id(),
      title: r.name(),
      notes: r.body() || "",
      completed: r.completed(),
      priority: r.priority() || 0,
      due: r.dueDate() ? r.dueDate().toISOString() : null,
      modified: r.modificationDate() ? r.modificationDate().toISOString() : null
    };
  });
  return JSON.stringify(out);
}
"#;

const CREATE_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Reminders");
  const list = app.lists.byName(argv[0]);
  const props = { name: argv[1], body: argv[2], priority: parseInt(argv[3], 10) };
  if (argv[4] !== "") { props.dueDate = new Date(argv[4]); }
  const r = app.Reminder(props);
  list.reminders.push(r);
  return JSON.stringify({ id: r.id(), completed: r.completed() });
}
"#;

const UPDATE_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Reminders");
  const r = app.reminders.byId(argv[0]);
  r.name = argv[1];
  r.body = argv[2];
  r.priority = parseInt(argv[3], 10);
  if (argv[5] === "true") {
    r.dueDate = null;
  } else if (argv[4] !== "") {
    r.dueDate = new Date(argv[4]);
  }
  return JSON.stringify({ id: r.id(), completed: r.completed() });
}
"#;

const DELETE_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Reminders");
  app.delete(app.reminders.byId(argv[0]));
  return "";
}
"#;

const SET_COMPLETED_SCRIPT: &str = r#"
function run(argv) {
  const app = Application("Reminders");
  const r = app.reminders.byId(argv[0]);
  r.completed = argv[1] === "true";
  return "";
}
"#;

/// One reminder as serialized by the JXA scripts.
#[derive(Debug, Deserialize)]
struct JxaReminder {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    due: Option<String>,
    #[serde(default)]
    modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JxaMutationResult {
    id: String,
    #[serde(default)]
    completed: bool,
}

/// [`RemindersBackend`] implementation over the Reminders scripting bridge.
pub struct OsaScriptBackend;

impl OsaScriptBackend {
    pub fn new() -> Self {
        Self
    }

    fn run_script(&self, script: &str, args: &[&str]) -> Result<String> {
        let output = Command::new("osascript")
            .arg("-l")
            .arg("JavaScript")
            .arg("-e")
            .arg(script)
            .args(args)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim().to_string();
            // -1743 is errAEEventNotPermitted: the user (or a profile) denied
            // automation access to Reminders.
            if message.contains("-1743") || message.contains("Not authorized") {
                return Err(Error::AccessDenied(message));
            }
            return Err(Error::Backend(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl RemindersBackend for OsaScriptBackend {
    fn reminders(&self, list_name: &str) -> Result<Vec<BackendReminder>> {
        let raw = self.run_script(LIST_SCRIPT, &[list_name])?;
        let parsed: Vec<JxaReminder> = serde_json::from_str(&raw)?;
        Ok(parsed
            .into_iter()
            .map(|r| jxa_to_backend(r, list_name))
            .collect())
    }

    fn create_reminder(&self, input: &CreateReminderInput) -> Result<BackendReminder> {
        let due = input.due_date.map(iso8601).unwrap_or_default();
        let priority = input.priority.to_string();
        let raw = self.run_script(
            CREATE_SCRIPT,
            &[
                &input.list_name,
                &input.title,
                &input.notes,
                &priority,
                &due,
            ],
        )?;
        let result: JxaMutationResult = serde_json::from_str(&raw)?;

        Ok(BackendReminder {
            id: result.id,
            title: input.title.clone(),
            notes: input.notes.clone(),
            list: input.list_name.clone(),
            priority: input.priority,
            completed: result.completed,
            due_date: input.due_date,
            modified_at: None,
        })
    }

    fn update_reminder(&self, id: &str, input: &UpdateReminderInput) -> Result<BackendReminder> {
        let due = input.due_date.map(iso8601).unwrap_or_default();
        let priority = input.priority.to_string();
        let clear = if input.clear_due_date { "true" } else { "false" };
        let raw = self.run_script(
            UPDATE_SCRIPT,
            &[id, &input.title, &input.notes, &priority, &due, clear],
        )?;
        let result: JxaMutationResult = serde_json::from_str(&raw)?;

        Ok(BackendReminder {
            id: result.id,
            title: input.title.clone(),
            notes: input.notes.clone(),
            list: String::new(),
            priority: input.priority,
            completed: result.completed,
            due_date: if input.clear_due_date {
                None
            } else {
                input.due_date
            },
            modified_at: None,
        })
    }

    fn delete_reminder(&self, id: &str) -> Result<()> {
        self.run_script(DELETE_SCRIPT, &[id])?;
        Ok(())
    }

    fn complete_reminder(&self, id: &str) -> Result<()> {
        self.run_script(SET_COMPLETED_SCRIPT, &[id, "true"])?;
        Ok(())
    }

    fn uncomplete_reminder(&self, id: &str) -> Result<()> {
        self.run_script(SET_COMPLETED_SCRIPT, &[id, "false"])?;
        Ok(())
    }
}

fn jxa_to_backend(r: JxaReminder, list_name: &str) -> BackendReminder {
    BackendReminder {
        id: r.id,
        title: r.title,
        notes: r.notes,
        list: list_name.to_string(),
        priority: r.priority,
        completed: r.completed,
        due_date: r.due.as_deref().and_then(parse_iso8601),
        modified_at: r.modified.as_deref().and_then(parse_iso8601),
    }
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
