//! A live object as reported by a listing.

use super::metadata::Metadata;
use serde::{Deserialize, Serialize};

/// One entry of [`crate::services::storage::Storage::list`].
///
/// Holds the identifier and the metadata record; content is never opened
/// while listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Identifier the object was stored under.
    pub id: String,

    /// Metadata written alongside the content.
    pub metadata: Metadata,
}

impl StoredObject {
    pub fn new(id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }
}
