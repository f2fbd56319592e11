//! Error types for lifehub-core.
//!
//! Storage and configuration failures are modeled with thiserror enums;
//! sync-protocol failures live in [`crate::sync::SyncError`].

use std::path::PathBuf;
use thiserror::Error;

/// Local persistence errors (entity tables, change ledger, kv store).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database file
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another connection
    #[error("database is locked")]
    Locked,

    /// A stored value could not be interpreted
    #[error("invalid stored value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Filesystem errors (data directory creation etc.)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Configuration load/save errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("failed to parse configuration: {0}")]
    ParseFailed(String),
}
