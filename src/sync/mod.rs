//! Directory-to-object-storage sync.
//!
//! A sync walks the root once, queues one [`UploadUnit`] per regular file
//! and lets a [`BatchUploader`] drain the queue. Files that cannot be opened
//! are recorded and skipped; the first such error is reported after the
//! batch finishes.

mod error;
mod iterator;
mod storage;
mod uploader;

pub use error::{StorageError, SyncError, TransferError, UploadFailure};
pub use iterator::{DEFAULT_CONTENT_TYPE, SyncIterator, UploadRequest, UploadUnit, object_key};
pub use storage::build_store;
pub use uploader::{BatchUploader, DEFAULT_UPLOAD_CONCURRENCY, ObjectStoreUploader, UploadStats};
