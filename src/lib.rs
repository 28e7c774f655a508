//! Watch a directory tree and mirror it into an object-storage bucket.
//!
//! The [`watcher`] module owns the watch lifecycle and fans each change out
//! to registered handlers; the [`sync`] module walks the tree and drives the
//! batch upload used by [`watcher::handlers::SyncHandler`].

pub mod logging;
pub mod config;
pub mod sync;
pub mod watcher;

pub use config::{ConfigError, Settings, StorageBackend, StorageConfig};
pub use sync::{
    BatchUploader, ObjectStoreUploader, SyncError, SyncIterator, TransferError, UploadStats,
    UploadUnit, build_store,
};
pub use watcher::handlers::{LogHandler, SyncHandler};
pub use watcher::{
    ChangeEvent, CompletionSignal, DispatchContext, DispatchEngine, EngineError, Handler,
    HandlerError, Op, WatchError,
};
