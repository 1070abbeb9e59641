//! Typed errors for the storage layer.
//!
//! Uses `thiserror` so callers can match on the failure instead of
//! string-sniffing an `anyhow` chain.

use thiserror::Error;

/// Errors that can occur while managing storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The configured save target names no known backend
    #[error("unsupported backend kind: {0}")]
    UnsupportedBackendKind(String),

    /// A database or table name is not safe to interpolate into DDL
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Backend kind has no connection parameters of the requested shape
    #[error("backend {kind} is missing connection parameter: {field}")]
    MissingParameter { kind: &'static str, field: &'static str },

    /// Driver-level failure (connect, query, commit, rollback)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure while preparing an embedded database
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
