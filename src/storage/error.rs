//! Error types for the storage engine

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the storage layer
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse configuration: {0}")]
    Config(String),

    #[error("failed to acquire lock for {resource} after {attempts} attempts")]
    LockFailed { resource: String, attempts: u32 },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("Invalid item id: {0:?}")]
    InvalidId(String),

    #[error("Item {0:?} must be a JSON object with a string id field")]
    InvalidItem(String),

    #[error("Item id {found:?} does not match the id it is saved under ({expected:?})")]
    IdMismatch { expected: String, found: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures worth retrying or escalating, as opposed to
    /// caller mistakes that will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Io { .. } | StoreError::LockFailed { .. } | StoreError::RetriesExhausted { .. }
        )
    }
}
