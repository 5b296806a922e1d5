//! Error types for Leizilla.
//!
//! Library crates use [`LeizillaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Leizilla operations.
#[derive(Debug, thiserror::Error)]
pub enum LeizillaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Retryable network failure (timeout, connection reset, 5xx, 429).
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Non-retryable network/HTTP failure.
    #[error("network error: {0}")]
    Network(String),

    /// The source could not be reached at all; fatal for the current run.
    #[error("source unreachable ({origin}): {message}")]
    SourceUnreachable { origin: String, message: String },

    /// A single record could not be built from the source page.
    #[error("malformed record at {location}: {reason}")]
    MalformedRecord { location: String, reason: String },

    /// HTML or title parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Duplicate identifier on a strict insert. Indicates a logic bug upstream.
    #[error("storage constraint violation: {0}")]
    StorageConstraint(String),

    /// Lock contention in the embedded database.
    #[error("storage busy: {0}")]
    StorageBusy(String),

    /// Upload to, or retrieval from, the archival service failed.
    #[error("archival failure: {0}")]
    Archival(String),

    /// Dataset export failed.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The run was cancelled by the user.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeizillaError>;

impl LeizillaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn unreachable(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnreachable {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::StorageBusy(_))
    }
}
