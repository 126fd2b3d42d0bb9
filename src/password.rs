//! Password gate hashes stored in `Metadata::password_hash`.

use crate::errors::{StorageError, StorageResult};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hash `password` as an Argon2id PHC string. An empty password yields an
/// empty hash, which means "no gate".
pub fn hash_password(password: &str) -> StorageResult<String> {
    if password.is_empty() {
        return Ok(String::new());
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| StorageError::Password(err.to_string()))
}

/// Check `password` against a stored hash. Objects without a hash are open.
/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.is_empty() {
        return true;
    }
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
