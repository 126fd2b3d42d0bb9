//! Object storage and lifecycle core for a short-lived file and paste
//! sharing service.
//!
//! Upload handlers allocate an identifier with
//! [`services::allocator::allocate_id`] and store content through the
//! [`services::Storage`] facade; download handlers read it back with its
//! [`models::Metadata`]; a [`services::Sweeper`] purges expired objects.

pub mod config;
pub mod context;
pub mod errors;
pub mod ids;
pub mod models;
pub mod password;
pub mod services;
pub mod stream;

pub use context::RequestContext;
pub use errors::{StorageError, StorageResult};
pub use models::{Metadata, StoredObject};
pub use services::Storage;
