//! Shared startup plumbing for the daemon and sync-once commands.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::Command;

use taskrelay_core::cancel::CancelToken;
use taskrelay_core::config::{default_db_path, Config};
use taskrelay_core::db::{Database, SqliteLedgerStore};
use taskrelay_core::local::{RemindersAdapter, RemindersBackend};
use taskrelay_core::remote::HomeAssistantAdapter;
use taskrelay_core::sync::{Bootstrap, Engine, Reconciler};
use taskrelay_core::Error;

use crate::error::CliError;
use crate::osascript::OsaScriptBackend;

/// The concrete engine type the CLI drives.
pub type CliEngine = Engine<
    RemindersAdapter<OsaScriptBackend>,
    HomeAssistantAdapter,
    SqliteLedgerStore,
    HomeAssistantAdapter,
>;

pub fn resolve_config_path(flag: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match flag {
        Some(path) => Ok(path),
        None => Config::default_path().ok_or(CliError::UnresolvedPath("config")),
    }
}

pub fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match flag {
        Some(path) => Ok(path),
        None => default_db_path().ok_or(CliError::UnresolvedPath("data")),
    }
}

/// Initializes the Reminders backend and probes access by listing the first
/// configured list. A platform denial prompts the user to grant access in
/// System Settings and retries exactly once.
pub fn init_reminders_backend(config: &Config) -> Result<OsaScriptBackend, CliError> {
    let backend = OsaScriptBackend::new();
    let probe_list = config
        .list_mappings
        .keys()
        .next()
        .ok_or_else(|| CliError::Config("list_mappings is empty".into()))?;

    tracing::info!("initialising Apple Reminders access (may trigger a permissions prompt)");
    match backend.reminders(probe_list) {
        Ok(_) => Ok(backend),
        Err(Error::AccessDenied(_)) => {
            eprintln!();
            eprintln!("⚠️  Reminders access is denied.");
            eprintln!("   Opening System Settings → Privacy & Security → Reminders…");
            let _ = Command::new("open")
                .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_Reminders")
                .spawn();
            eprint!("   Press Enter after granting access to retry: ");
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;

            backend.reminders(probe_list)?;
            Ok(backend)
        }
        Err(err) => Err(err.into()),
    }
}

/// Builds the fully wired engine: ledger store, both adapters, connectivity
/// check, and the first-run bootstrap.
pub async fn build_engine(
    config: &Config,
    db_path: PathBuf,
    cancel: &CancelToken,
) -> Result<CliEngine, CliError> {
    let store = SqliteLedgerStore::new(Database::open(&db_path)?);
    tracing::info!(path = %db_path.display(), "ledger opened");

    let backend = init_reminders_backend(config)?;
    let local = RemindersAdapter::new(backend);

    let remote = HomeAssistantAdapter::new(&config.ha_url, &config.ha_token)?;
    tracing::info!(url = %config.ha_url, "pinging Home Assistant");
    remote.ping(cancel).await.map_err(|err| match err {
        Error::Credential(message) => Error::Credential(format!(
            "{message}\n\nCheck ha_url and ha_token in your config file"
        )),
        other => other,
    })?;
    tracing::info!("Home Assistant reachable");

    let mut bootstrap = Bootstrap::new(
        &local,
        &remote,
        &store,
        std::io::stdin().lock(),
        std::io::stdout(),
    );
    bootstrap.run(cancel, &config.list_mappings).await?;

    let reconciler = Reconciler::new(local, remote.clone(), store);
    Ok(Engine::new(
        reconciler,
        remote,
        config.list_mappings.clone(),
        config.poll_interval(),
    ))
}
