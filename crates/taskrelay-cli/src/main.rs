//! TaskRelay - macOS daemon that syncs Apple Reminders ↔ Home Assistant
//! todo lists bidirectionally using last-write-wins conflict resolution.
//!
//! Usage:
//!
//! ```text
//! taskrelay daemon        # start polling + WebSocket listener
//! taskrelay sync-once     # single reconcile pass then exit
//! ```

mod cli;
mod commands;
mod error;
mod osascript;

use clap::Parser;
use taskrelay_core::config::Config;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("taskrelay_core={level}").parse().expect("valid directive"))
                .add_directive(format!("taskrelay_cli={level}").parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = commands::common::resolve_config_path(cli.config)?;
    let config = Config::load(&config_path)?;
    tracing::info!(
        ha_url = %config.ha_url,
        poll_interval_secs = config.poll_interval_secs,
        lists = config.list_mappings.len(),
        "config loaded"
    );

    let db_path = commands::common::resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Daemon => commands::daemon::run_daemon(&config, db_path).await,
        Commands::SyncOnce => commands::sync::run_sync_once(&config, db_path).await,
    }
}
