//! `taskrelay sync-once`: a single reconcile pass.

use std::path::PathBuf;

use taskrelay_core::cancel::CancelToken;
use taskrelay_core::config::Config;

use crate::commands::common;
use crate::error::CliError;

pub async fn run_sync_once(config: &Config, db_path: PathBuf) -> Result<(), CliError> {
    let (handle, cancel) = CancelToken::new();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let engine = common::build_engine(config, db_path, &cancel).await?;

    tracing::info!("running single sync pass");
    let report = engine.run_once(&cancel).await;
    tracing::info!(
        created = report.stats.created,
        updated = report.stats.updated,
        deleted = report.stats.deleted,
        conflicts = report.stats.conflicts,
        errors = report.stats.errors,
        "sync complete"
    );

    match report.first_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
