//! `taskrelay daemon`: continuous polling + WebSocket listener.

use std::path::PathBuf;

use taskrelay_core::cancel::CancelToken;
use taskrelay_core::config::Config;

use crate::commands::common;
use crate::error::CliError;

pub async fn run_daemon(config: &Config, db_path: PathBuf) -> Result<(), CliError> {
    let (handle, cancel) = CancelToken::new();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            handle.cancel();
        }
    });

    let engine = common::build_engine(config, db_path, &cancel).await?;

    tracing::info!(
        poll_interval_secs = config.poll_interval_secs,
        "daemon starting"
    );

    match engine.run(cancel).await {
        Err(err) if err.is_cancelled() => {
            tracing::info!("shutdown complete");
            Ok(())
        }
        Err(err) => Err(err.into()),
        Ok(()) => Ok(()),
    }
}
