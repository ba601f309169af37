//! Runtime configuration loading and validation.
//!
//! The config is a JSON file, by default at
//! `~/.config/taskrelay/config.json`:
//!
//! ```json
//! {
//!   "ha_url": "http://homeassistant.local:8123",
//!   "ha_token": "<long-lived access token>",
//!   "poll_interval_secs": 30,
//!   "list_mappings": { "Shopping": "todo.shopping" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::is_http_url;

/// Minimum allowed polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Maximum allowed polling interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

const fn default_poll_interval_secs() -> u64 {
    30
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the Home Assistant instance,
    /// e.g. `http://homeassistant.local:8123`.
    pub ha_url: String,

    /// Long-lived access token used to authenticate with Home Assistant.
    pub ha_token: String,

    /// How often Apple Reminders are polled for changes, in seconds.
    /// Minimum 10, maximum 300. Defaults to 30.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Apple Reminders list name → Home Assistant todo entity id.
    /// Example: `{"Shopping": "todo.shopping", "Work": "todo.work_tasks"}`.
    pub list_mappings: BTreeMap<String, String>,

    /// Optional telemetry-export settings, handed to the exporting
    /// collaborator as-is. Omit the block to disable telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetryConfig>,
}

/// Optional telemetry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// gRPC host:port of the OTLP collector (e.g. "localhost:4317").
    pub otlp_endpoint: String,

    /// Disables TLS for the collector connection. For local collectors.
    #[serde(default)]
    pub insecure: bool,

    /// Overrides the reported service name. Defaults to "taskrelay".
    #[serde(default)]
    pub service_name: Option<String>,

    /// Key-value pairs sent as metadata on every export request, e.g.
    /// `{"Authorization": "Bearer <token>"}`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Reads and validates the configuration file at the given path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("opening config file {path:?}: {err}")))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|err| Error::Config(format!("parsing config file {path:?}: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all required fields are present and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.ha_url.is_empty() {
            return Err(Error::Config("ha_url is required".into()));
        }
        if !is_http_url(&self.ha_url) {
            return Err(Error::Config(format!(
                "ha_url {:?} must be a valid http or https URL",
                self.ha_url
            )));
        }

        if self.ha_token.is_empty() {
            return Err(Error::Config("ha_token is required".into()));
        }

        let interval = self.poll_interval();
        if interval < MIN_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "poll_interval_secs {} is too short (minimum {}s)",
                self.poll_interval_secs,
                MIN_POLL_INTERVAL.as_secs()
            )));
        }
        if interval > MAX_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "poll_interval_secs {} is too long (maximum {}s)",
                self.poll_interval_secs,
                MAX_POLL_INTERVAL.as_secs()
            )));
        }

        if self.list_mappings.is_empty() {
            return Err(Error::Config(
                "list_mappings must contain at least one entry".into(),
            ));
        }
        for (list, entity) in &self.list_mappings {
            if list.is_empty() {
                return Err(Error::Config(
                    "list_mappings contains an empty Reminders list name".into(),
                ));
            }
            if entity.is_empty() {
                return Err(Error::Config(format!(
                    "list_mappings[{list:?}] has an empty HA entity ID"
                )));
            }
        }

        if let Some(telemetry) = &self.telemetry {
            if telemetry.otlp_endpoint.is_empty() {
                return Err(Error::Config(
                    "telemetry.otlp_endpoint is required when telemetry is configured".into(),
                ));
            }
        }

        Ok(())
    }

    /// The polling interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Default config file path: `<config dir>/taskrelay/config.json`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskrelay").join("config.json"))
    }
}

/// Default ledger database path: `<data dir>/taskrelay/state.db`.
#[must_use]
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("taskrelay").join("state.db"))
}
