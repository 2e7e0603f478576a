//! Error types for the hearth request routing and storage lease system.

use crate::store::StorageHandle;
use thiserror::Error;

/// Storage-related errors
///
/// These travel back to the caller over the worker bridge reply channel, so
/// they must stay `Send` and carry owned data only.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unknown or closed storage handle: {0}")]
    UnknownHandle(StorageHandle),

    #[error("Storage backend is paused; another context owns it")]
    Paused,

    #[error("Storage lease is being released; no new stores may be opened")]
    Releasing,

    #[error("Storage backend is busy: {0}")]
    Busy(String),

    #[error("Invalid store locator: {0}")]
    InvalidLocator(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Lease failure: {0}")]
    Lease(String),

    #[error("Storage worker is not running")]
    WorkerUnavailable,

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => StorageError::IoError(io),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Errors surfaced to application code (request facade, sessions, config)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request method: {0}")]
    InvalidMethod(String),

    #[error("Invalid request state: {0}")]
    InvalidState(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}
