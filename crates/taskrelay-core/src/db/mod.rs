//! Ledger database layer

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{LedgerStore, SqliteLedgerStore};
