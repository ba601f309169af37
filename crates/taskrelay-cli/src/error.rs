use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] taskrelay_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Could not resolve the {0} directory for this platform")]
    UnresolvedPath(&'static str),
}

impl CliError {
    /// True when the wrapped core error is the cancellation sentinel, which
    /// the daemon treats as a clean shutdown rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(err) if err.is_cancelled())
    }
}
