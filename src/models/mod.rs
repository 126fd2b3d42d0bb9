//! Plain records handed across the storage facade.
//!
//! `Metadata` is backend-agnostic: the JSON sidecar and attribute-map
//! encodings live next to it, and each backend picks the one it needs.

pub mod metadata;
pub mod object;

pub use metadata::Metadata;
pub use object::StoredObject;
