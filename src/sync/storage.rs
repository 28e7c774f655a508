//! Object-storage backend construction.

use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;

use super::error::StorageError;
use crate::config::{StorageBackend, StorageConfig};

/// Build the object store for `bucket` in `region`.
///
/// S3 credentials come from the standard AWS environment variables. Bucket
/// and region are passed through unvalidated; an empty region leaves the
/// builder default in place.
pub fn build_store(
    bucket: &str,
    region: &str,
    config: &StorageConfig,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        StorageBackend::S3 => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if !region.is_empty() {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &config.endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(config.allow_http);
            }

            let store = builder.build().map_err(|source| StorageError::Build {
                backend: "s3",
                source,
            })?;
            crate::debug_event!("storage", "s3", "bucket '{bucket}' in '{region}'");
            Ok(Arc::new(store))
        }

        StorageBackend::Local => {
            let base = config
                .local_path
                .as_ref()
                .ok_or(StorageError::MissingLocalPath)?;
            let path = base.join(bucket);
            std::fs::create_dir_all(&path).map_err(|source| StorageError::LocalPath {
                path: path.clone(),
                source,
            })?;

            let store =
                LocalFileSystem::new_with_prefix(&path).map_err(|source| StorageError::Build {
                    backend: "local",
                    source,
                })?;
            crate::debug_event!("storage", "local", "{}", path.display());
            Ok(Arc::new(store))
        }

        StorageBackend::Memory => Ok(Arc::new(InMemory::new())),
    }
}
