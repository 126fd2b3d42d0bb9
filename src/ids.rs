//! Short random identifiers for stored objects and delete tokens.
//!
//! These are uniqueness aids, not secrets: a delete token only protects an
//! object as well as 62^len guesses do.

use rand::{Rng, distributions::Alphanumeric};

pub const OBJECT_ID_LENGTH: usize = 12;
pub const DELETE_TOKEN_LENGTH: usize = 16;

/// Generate `length` characters drawn uniformly from `[a-zA-Z0-9]`.
pub fn generate(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn object_id() -> String {
    generate(OBJECT_ID_LENGTH)
}

pub fn delete_token() -> String {
    generate(DELETE_TOKEN_LENGTH)
}
