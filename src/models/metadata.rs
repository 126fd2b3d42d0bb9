//! Metadata attached 1:1 to every stored object, plus its two encodings:
//! a JSON sidecar document and a flat string attribute map.

use crate::errors::{StorageError, StorageResult};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";
const FALLBACK_FILENAME: &str = "file";

pub const FILENAME_KEY: &str = "Filename";
pub const CONTENT_TYPE_KEY: &str = "Content-Type";
pub const CONTENT_LENGTH_KEY: &str = "Content-Length";
pub const PASSWORD_HASH_KEY: &str = "Password-Hash";
pub const EXPIRES_AT_KEY: &str = "Expires-At";
pub const DELETE_TOKEN_KEY: &str = "Delete-Token";

/// Immutable description of one stored object.
///
/// Every field is a string so the record survives attribute-map backends
/// unchanged. Empty strings mean "unset".
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    /// Client-supplied name with directory components stripped.
    pub filename: String,

    /// MIME type served back on download.
    pub content_type: String,

    /// Byte size in decimal.
    pub content_length: String,

    /// Argon2 PHC string, or empty for no password gate.
    #[serde(default)]
    pub password_hash: String,

    /// RFC 3339 UTC timestamp, or empty for "never expires".
    #[serde(default)]
    pub expires_at: String,

    /// Token that lets the uploader delete the object without logging in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub delete_token: String,
}

impl Metadata {
    pub fn new(
        filename: &str,
        content_type: &str,
        content_length: u64,
        password_hash: impl Into<String>,
        expires_at: impl Into<String>,
    ) -> Self {
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            content_type.to_string()
        };
        Self {
            filename: sanitize_filename(filename),
            content_type,
            content_length: content_length.to_string(),
            password_hash: password_hash.into(),
            expires_at: expires_at.into(),
            delete_token: String::new(),
        }
    }

    pub fn with_delete_token(mut self, token: impl Into<String>) -> Self {
        self.delete_token = token.into();
        self
    }

    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    /// Parsed `expires_at`; `None` when unset or unparsable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expires_at)
    }

    /// True only when `now` is strictly after a parsable `expires_at`.
    /// Unset or garbled timestamps never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now > deadline)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Constant-time delete-token check. Objects stored without a token
    /// cannot be deleted this way.
    pub fn authorizes_delete(&self, token: &str) -> bool {
        if self.delete_token.is_empty() {
            return false;
        }
        self.delete_token.as_bytes().ct_eq(token.as_bytes()).into()
    }

    /// Sidecar document for filesystem backends.
    pub fn to_sidecar(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_sidecar(id: &str, raw: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(raw).map_err(|err| StorageError::corrupt(id, err.to_string()))
    }

    /// Flat attribute pairs for object-store backends. Unset optional fields
    /// are left out.
    pub fn to_attribute_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (FILENAME_KEY, self.filename.clone()),
            (CONTENT_TYPE_KEY, self.content_type.clone()),
            (CONTENT_LENGTH_KEY, self.content_length.clone()),
        ];
        for (key, value) in [
            (PASSWORD_HASH_KEY, &self.password_hash),
            (EXPIRES_AT_KEY, &self.expires_at),
            (DELETE_TOKEN_KEY, &self.delete_token),
        ] {
            if !value.is_empty() {
                pairs.push((key, value.clone()));
            }
        }
        pairs
    }

    /// Inverse of [`Metadata::to_attribute_pairs`]. Keys match
    /// case-insensitively because S3 lowercases user metadata on the wire.
    /// `Filename`, `Content-Type` and `Content-Length` are required.
    pub fn from_attribute_pairs<'a, I>(id: &str, pairs: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut meta = Metadata::default();
        let mut seen = [false; 3];
        for (key, value) in pairs {
            let value = value.to_string();
            if key.eq_ignore_ascii_case(FILENAME_KEY) {
                meta.filename = value;
                seen[0] = true;
            } else if key.eq_ignore_ascii_case(CONTENT_TYPE_KEY) {
                meta.content_type = value;
                seen[1] = true;
            } else if key.eq_ignore_ascii_case(CONTENT_LENGTH_KEY) {
                meta.content_length = value;
                seen[2] = true;
            } else if key.eq_ignore_ascii_case(PASSWORD_HASH_KEY) {
                meta.password_hash = value;
            } else if key.eq_ignore_ascii_case(EXPIRES_AT_KEY) {
                meta.expires_at = value;
            } else if key.eq_ignore_ascii_case(DELETE_TOKEN_KEY) {
                meta.delete_token = value;
            }
        }

        let required = [FILENAME_KEY, CONTENT_TYPE_KEY, CONTENT_LENGTH_KEY];
        if let Some(missing) = required
            .iter()
            .zip(seen)
            .find_map(|(key, present)| (!present).then_some(*key))
        {
            return Err(StorageError::corrupt(
                id,
                format!("attribute `{}` missing", missing),
            ));
        }
        Ok(meta)
    }
}

/// `now + hours` in RFC 3339, or empty when `hours <= 0`.
pub fn compute_expires_at(hours: i64) -> String {
    compute_expires_at_from(Utc::now(), hours)
}

pub fn compute_expires_at_from(now: DateTime<Utc>, hours: i64) -> String {
    if hours <= 0 {
        return String::new();
    }
    format_timestamp(now + Duration::hours(hours))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Parse a user's expiry choice in hours. Blank, unparsable or non-positive
/// input means "never" (0); anything else is clamped to `min..=max`.
pub fn clamp_expiration_hours(raw: &str, min: i64, max: i64) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(hours) if hours > 0 => hours.clamp(min, max),
        _ => 0,
    }
}

/// Reduce a client-supplied path to a bare file name.
///
/// Components are split on `/` and `\`, `.` and `..` are resolved lexically,
/// and the last surviving component is kept.
pub fn sanitize_filename(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let name: String = parts
        .last()
        .map(|name| name.chars().filter(|c| !c.is_control()).collect())
        .unwrap_or_default();
    if name.trim().is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        name
    }
}
