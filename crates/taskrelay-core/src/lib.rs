//! taskrelay-core - Core library for TaskRelay
//!
//! This crate contains the shared item model, the sync ledger, the Apple
//! Reminders and Home Assistant adapters, and the reconciliation engine that
//! keeps the two sides in bidirectional agreement.

pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod local;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use cancel::{CancelHandle, CancelToken};
pub use config::Config;
pub use error::{Error, Result};
pub use models::{Item, LedgerRow, Priority};
pub use sync::{Bootstrap, Engine, PassReport, Reconciler, SyncStats};
