//! Error types for sync operations.

use std::path::PathBuf;
use thiserror::Error;

/// Why a sync failed.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    #[error("No object key for {path}: names below the root must be valid UTF-8")]
    InvalidKey { path: PathBuf },

    #[error("Cannot open {path} for upload: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Sync cancelled with {remaining} files not uploaded")]
    Interrupted { remaining: usize },
}

/// Errors reported by a batch uploader.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("{} of {attempted} uploads failed", .failures.len())]
    Batch {
        failures: Vec<UploadFailure>,
        attempted: usize,
    },
}

/// One object that could not be written.
#[derive(Error, Debug)]
#[error("upload of '{key}' failed: {error}")]
pub struct UploadFailure {
    pub key: String,
    #[source]
    pub error: std::io::Error,
}

/// Errors building a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to build {backend} store: {source}")]
    Build {
        backend: &'static str,
        #[source]
        source: object_store::Error,
    },

    #[error("Local backend requires storage.local_path")]
    MissingLocalPath,

    #[error("Cannot prepare local store at {path}: {source}")]
    LocalPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
