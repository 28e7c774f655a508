//! Batch uploader contract and its object-store implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore};
use tokio::io::AsyncWriteExt;

use super::error::{TransferError, UploadFailure};
use super::iterator::{SyncIterator, UploadRequest};
use crate::watcher::DispatchContext;

/// Uploads running at once when not configured otherwise.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Totals for one successful batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub objects: usize,
    pub bytes: u64,
}

/// Consumes a [`SyncIterator`] and transfers every request it yields.
///
/// Implementations must stop pulling new requests once `ctx` is cancelled
/// but let in-flight transfers finish. Per-file open errors stay in the
/// iterator; only transfer failures are returned here.
#[async_trait]
pub trait BatchUploader: Send + Sync {
    async fn upload_with_iterator(
        &self,
        ctx: &DispatchContext,
        iter: &mut SyncIterator,
    ) -> Result<UploadStats, TransferError>;
}

/// Streams files into an [`ObjectStore`] with bounded concurrency.
///
/// Each request is attempted once. Failures are collected and reported
/// together after the whole batch ran.
#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
    content_types: bool,
}

impl ObjectStoreUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            content_types: true,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Whether objects carry a `Content-Type` attribute.
    ///
    /// `LocalFileSystem` rejects writes with attributes, so turn this off
    /// for the local backend.
    pub fn with_content_types(mut self, enabled: bool) -> Self {
        self.content_types = enabled;
        self
    }

    async fn upload_one(
        store: Arc<dyn ObjectStore>,
        request: UploadRequest,
        content_types: bool,
    ) -> Result<u64, UploadFailure> {
        let UploadRequest {
            key,
            source,
            content_type,
            body,
        } = request;
        let fail = |error: std::io::Error| UploadFailure {
            key: key.clone(),
            error,
        };

        let mut attributes = Attributes::new();
        if content_types {
            attributes.insert(Attribute::ContentType, content_type.into());
        }

        let location = ObjectPath::from(key.as_str());
        let mut writer = BufWriter::new(store, location).with_attributes(attributes);
        let mut file = tokio::fs::File::from_std(body);

        let bytes = match tokio::io::copy(&mut file, &mut writer).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::debug!("[upload] abort of '{key}' failed: {abort}");
                }
                return Err(fail(e));
            }
        };
        writer.shutdown().await.map_err(fail)?;

        crate::debug_event!(
            "upload",
            "stored",
            "{} as '{key}' ({bytes} bytes)",
            source.display()
        );
        Ok(bytes)
    }
}

fn request_stream<'a>(
    ctx: &'a DispatchContext,
    iter: &'a mut SyncIterator,
) -> impl futures::Stream<Item = UploadRequest> + Send + 'a {
    futures::stream::unfold(iter, move |iter| async move {
        if ctx.is_cancelled() {
            return None;
        }
        let request = iter.next_request().await?;
        Some((request, iter))
    })
}

#[async_trait]
impl BatchUploader for ObjectStoreUploader {
    async fn upload_with_iterator(
        &self,
        ctx: &DispatchContext,
        iter: &mut SyncIterator,
    ) -> Result<UploadStats, TransferError> {
        crate::debug_event!(
            "upload",
            "batch",
            "{} files into '{}'",
            iter.remaining(),
            iter.bucket()
        );

        // Files are opened one pull at a time, so cancellation stops new opens
        let requests = request_stream(ctx, iter);

        let uploads = requests
            .map(|request| {
                Self::upload_one(Arc::clone(&self.store), request, self.content_types)
            })
            .buffer_unordered(self.concurrency);
        tokio::pin!(uploads);

        let mut stats = UploadStats::default();
        let mut failures = Vec::new();
        let mut attempted = 0;

        while let Some(result) = uploads.next().await {
            attempted += 1;
            match result {
                Ok(bytes) => {
                    stats.objects += 1;
                    stats.bytes += bytes;
                }
                Err(failure) => {
                    tracing::warn!("[upload] {failure}");
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(stats)
        } else {
            Err(TransferError::Batch {
                failures,
                attempted,
            })
        }
    }
}
