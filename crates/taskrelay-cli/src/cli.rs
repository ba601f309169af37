//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "taskrelay",
    about = "Bidirectional Apple Reminders ↔ Home Assistant todo sync",
    version
)]
pub struct Cli {
    /// Path to config.json (defaults to ~/.config/taskrelay/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ledger database (defaults to ~/.local/share/taskrelay/state.db)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as a continuous daemon (polling + WebSocket listener)
    Daemon,
    /// Run a single sync pass then exit
    SyncOnce,
}
