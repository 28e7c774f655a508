//! Error types for the watch-and-dispatch engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Errors from the watch session.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch root can not be empty")]
    EmptyRoot,

    #[error("Cannot watch path {path}: {reason}")]
    SetupFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Watch session already started")]
    AlreadyStarted,

    #[error("Watch session closed")]
    Closed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::EventError {
            details: e.to_string(),
        }
    }
}

/// Errors from the dispatch engine lifecycle.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine already started; handlers must be registered before start")]
    AlreadyStarted,

    #[error("Engine not started")]
    NotStarted,

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Dispatch loop terminated abnormally: {reason}")]
    DispatchLoop { reason: String },
}

/// Errors returned by a single handler invocation.
///
/// These stay local to the invocation: the engine logs them and keeps the
/// latest one per handler name, nothing else.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{reason}")]
    Failed { reason: String },
}
