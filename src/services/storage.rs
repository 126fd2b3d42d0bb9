//! The storage facade every caller depends on.
//!
//! One capability set, one implementation per backend, picked once at
//! startup. Callers hold an `Arc<dyn Storage>` and never see backend types.

use crate::{
    context::RequestContext,
    errors::{StorageError, StorageResult},
    models::{Metadata, StoredObject},
    stream::ByteStream,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Every live object with its metadata, in backend order. Internal
    /// records (sidecars, temp files) never appear.
    async fn list(&self, ctx: &RequestContext) -> StorageResult<Vec<StoredObject>>;

    /// Open the raw content. Absence is reported as `NotFound`.
    async fn get(&self, ctx: &RequestContext, id: &str) -> StorageResult<ByteStream>;

    /// Content plus metadata. Content without readable metadata is
    /// `CorruptMetadata`, never an empty record.
    async fn get_with_metadata(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> StorageResult<(ByteStream, Metadata)>;

    /// Metadata only; content is not opened.
    async fn get_only_metadata(&self, ctx: &RequestContext, id: &str) -> StorageResult<Metadata>;

    /// Write content fully, then its metadata. Silently overwrites `id`.
    async fn put(
        &self,
        ctx: &RequestContext,
        id: &str,
        content: ByteStream,
        metadata: &Metadata,
    ) -> StorageResult<()>;

    /// Remove content and metadata together, content first.
    async fn delete(&self, ctx: &RequestContext, id: &str) -> StorageResult<()>;

    /// Purge every object whose `expires_at` is before `now`.
    ///
    /// A failure on one object is logged and skipped; the returned count only
    /// includes successful deletions. Listing failures and cancellation abort
    /// the sweep.
    async fn delete_expired_at(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let objects = self.list(ctx).await?;
        let total = objects.len();
        let mut deleted = 0;

        for object in objects
            .into_iter()
            .filter(|object| object.metadata.is_expired_at(now))
        {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            match self.delete(ctx, &object.id).await {
                Ok(()) => {
                    debug!(id = %object.id, expires_at = %object.metadata.expires_at, "deleted expired object");
                    deleted += 1;
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(id = %object.id, error = %err, "failed to delete expired object, skipping");
                }
            }
        }

        info!(
            backend = self.storage_type(),
            scanned = total,
            deleted,
            "expired object sweep finished"
        );
        Ok(deleted)
    }

    async fn delete_expired(&self, ctx: &RequestContext) -> StorageResult<usize> {
        self.delete_expired_at(ctx, Utc::now()).await
    }

    /// Classify an error returned by this backend as "object absent".
    fn file_not_exists(&self, err: &StorageError) -> bool {
        err.is_not_found()
    }

    /// Human-readable backend label for logs; never used for control flow.
    fn storage_type(&self) -> &'static str;
}
