//! Collision-checked identifier allocation.
//!
//! Check-then-act: a free candidate can still be claimed by a concurrent
//! upload before `put`. With 62^12 candidates that race is ignored.

use crate::{
    context::RequestContext,
    errors::{StorageError, StorageResult},
    ids,
    services::storage::Storage,
};
use tracing::debug;

pub const MAX_ATTEMPTS: usize = 32;

/// Find an identifier with no live object behind it.
pub async fn allocate_id(storage: &dyn Storage, ctx: &RequestContext) -> StorageResult<String> {
    allocate_with(storage, ctx, ids::object_id).await
}

/// Like [`allocate_id`] with a caller-supplied candidate generator.
pub async fn allocate_with<F>(
    storage: &dyn Storage,
    ctx: &RequestContext,
    mut candidate: F,
) -> StorageResult<String>
where
    F: FnMut() -> String,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let id = candidate();
        match storage.get_only_metadata(ctx, &id).await {
            Err(err) if storage.file_not_exists(&err) => return Ok(id),
            // Corrupt metadata still means the name is taken.
            Ok(_) | Err(StorageError::CorruptMetadata { .. }) => {
                debug!(id = %id, attempt, "identifier collision, retrying");
            }
            Err(err) => return Err(err),
        }
    }
    Err(StorageError::AllocationExhausted {
        attempts: MAX_ATTEMPTS,
    })
}
