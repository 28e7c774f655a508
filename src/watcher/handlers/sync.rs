//! Handler that mirrors the watched tree into an object-storage bucket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::sync::{BatchUploader, SyncError, SyncIterator, UploadStats};
use crate::watcher::{ChangeEvent, CompletionSignal, DispatchContext, Handler, HandlerError};

/// Full-tree sync on every change.
///
/// Each invocation re-walks the root and re-uploads every regular file;
/// there is no delta tracking.
pub struct SyncHandler {
    root: PathBuf,
    bucket: String,
    uploader: Arc<dyn BatchUploader>,
}

impl SyncHandler {
    pub fn new(
        root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        uploader: Arc<dyn BatchUploader>,
    ) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
            uploader,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Run one full sync of the root.
    ///
    /// A transfer error takes precedence over a walk or file-open error
    /// recorded by the iterator.
    pub async fn sync(&self, ctx: &DispatchContext) -> Result<UploadStats, SyncError> {
        let root = self.root.clone();
        let bucket = self.bucket.clone();
        let mut iter = tokio::task::spawn_blocking(move || SyncIterator::new(&root, bucket))
            .await
            .map_err(|e| SyncError::Walk {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;

        crate::debug_event!(
            "sync",
            "walked",
            "{} files under {}",
            iter.remaining(),
            self.root.display()
        );

        let stats = self.uploader.upload_with_iterator(ctx, &mut iter).await?;

        if iter.has_next() {
            return Err(SyncError::Interrupted {
                remaining: iter.remaining(),
            });
        }
        if let Some(err) = iter.take_err() {
            return Err(err);
        }

        crate::log_event!(
            "sync",
            "synced",
            "folder '{}' with bucket '{}' ({} objects, {} bytes)",
            self.root.display(),
            self.bucket,
            stats.objects,
            stats.bytes
        );
        Ok(stats)
    }
}

#[async_trait]
impl Handler for SyncHandler {
    async fn handle(
        &self,
        ctx: &DispatchContext,
        event: &ChangeEvent,
        done: CompletionSignal,
    ) -> Result<(), HandlerError> {
        if ctx.is_cancelled() {
            crate::log_event!("sync", "skipped", "cancellation received before start");
            done.done();
            return Ok(());
        }

        crate::debug_event!("sync", "triggered", "{event}");
        let result = self.sync(ctx).await;
        done.done();

        result.map(|_| ()).map_err(HandlerError::from)
    }
}
