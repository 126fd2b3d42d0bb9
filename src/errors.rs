//! Error taxonomy shared by every storage backend.
//!
//! Callers branch on the semantic class (absent, corrupt, unavailable,
//! cancelled), never on a backend's native error type. Use
//! [`crate::services::storage::Storage::file_not_exists`] to test for absence.

use std::io;
use thiserror::Error;

/// Boxed source error for backends whose native errors differ in type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{id}` not found")]
    NotFound { id: String },
    #[error("object `{id}` has corrupt metadata: {reason}")]
    CorruptMetadata { id: String, reason: String },
    #[error("identifier `{id}` invalid: {reason}")]
    InvalidIdentifier { id: String, reason: String },
    #[error("{op} `{id}` failed: {source}")]
    Io {
        op: &'static str,
        id: String,
        #[source]
        source: io::Error,
    },
    #[error("{backend} backend unavailable during {op} `{id}`: {source}")]
    BackendUnavailable {
        backend: &'static str,
        op: &'static str,
        id: String,
        #[source]
        source: BoxError,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    #[error("invalid storage configuration: {0}")]
    Config(String),
    #[error("no free identifier after {attempts} attempts")]
    AllocationExhausted { attempts: usize },
    #[error("password hashing failed: {0}")]
    Password(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub(crate) fn io(op: &'static str, id: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            op,
            id: id.into(),
            source,
        }
    }

    pub(crate) fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True only for the "object absent" class.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the caller's context was cancelled or its deadline elapsed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
