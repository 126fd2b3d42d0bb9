//! Storage facade, its three backends, and the helpers built on top.

pub mod allocator;
pub mod local;
pub mod s3;
pub mod storage;
pub mod storj;
pub mod sweeper;

use crate::{config::StorageConfig, errors::StorageResult};
use std::sync::Arc;
use tracing::info;

pub use local::LocalStorage;
pub use s3::S3Storage;
pub use storage::Storage;
pub use storj::StorjStorage;
pub use sweeper::Sweeper;

/// Build the configured backend. Called once at startup.
pub async fn build_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Local { upload_dir } => Arc::new(LocalStorage::new(upload_dir)),
        StorageConfig::S3(s3) => Arc::new(S3Storage::new(s3)?),
        StorageConfig::Storj(storj) => Arc::new(StorjStorage::connect(storj).await?),
    };
    info!(backend = storage.storage_type(), "storage backend initialized");
    Ok(storage)
}
