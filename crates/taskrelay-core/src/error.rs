//! Error types for taskrelay-core

use thiserror::Error;

/// Result type alias using taskrelay-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in taskrelay-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Home Assistant rejected the access token. Never retried.
    #[error("Credential error: {0}")]
    Credential(String),

    /// The platform withheld Reminders access (macOS TCC).
    #[error("Reminders access denied: {0}")]
    AccessDenied(String),

    /// Remote service returned an unexpected response.
    #[error("Home Assistant error: {0}")]
    Remote(String),

    /// HTTP transport failure (timeout, connection reset, 5xx surfaced by reqwest).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Ledger database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Reminders backend failure
    #[error("Reminders backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The operation was cancelled via the shutdown token.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True when retrying cannot help: bad credentials, bad config, denied
    /// access, or cancellation. The retry wrapper gives up immediately on
    /// these.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Credential(_) | Self::AccessDenied(_) | Self::Cancelled
        )
    }

    /// True when the error is the cancellation sentinel.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_are_terminal() {
        assert!(Error::Credential("401".into()).is_terminal());
        assert!(Error::Cancelled.is_terminal());
        assert!(!Error::Remote("503".into()).is_terminal());
    }

    #[test]
    fn cancelled_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Remote("boom".into()).is_cancelled());
    }
}
