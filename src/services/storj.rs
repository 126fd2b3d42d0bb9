//! src/services/storj.rs
//!
//! StorjStorage talks to the Storj network through its S3-compatible
//! gateway. The pre-shared access grant is exchanged once, at construction,
//! for gateway credentials; after that every call goes through the same
//! attribute-map code path as [`S3Storage`], plus an optional per-object
//! expiry hint that the network enforces on its own.

use crate::{
    config::StorjConfig,
    context::RequestContext,
    errors::{StorageError, StorageResult},
    models::{Metadata, StoredObject, metadata::format_timestamp},
    services::{s3::S3Storage, storage::Storage},
    stream::ByteStream,
};
use async_trait::async_trait;
use chrono::Utc;
use object_store::{ObjectStore, aws::AmazonS3Builder};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Gateway attribute honoured as a network-side expiry.
pub const OBJECT_EXPIRES_KEY: &str = "Object-Expires";
const GATEWAY_REGION: &str = "us-east-1";

#[derive(Serialize)]
struct RegisterAccessRequest<'a> {
    access_grant: &'a str,
    public: bool,
}

/// Credentials returned by the Storj auth service.
#[derive(Deserialize, Debug, Clone)]
pub struct GatewayCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub endpoint: String,
}

#[derive(Clone, Debug)]
pub struct StorjStorage {
    inner: S3Storage,
    object_ttl: Option<Duration>,
}

impl StorjStorage {
    /// Register the access grant and open the bucket through the gateway.
    /// The bucket must already exist.
    pub async fn connect(config: &StorjConfig) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("storj bucket is required".into()));
        }
        let credentials = register_access(&config.auth_url, &config.access_grant).await?;

        let store = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(GATEWAY_REGION)
            .with_endpoint(&credentials.endpoint)
            .with_access_key_id(&credentials.access_key_id)
            .with_secret_access_key(&credentials.secret_key)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build storj gateway store: {}", e)))?;

        info!(bucket = %config.bucket, endpoint = %credentials.endpoint, "storj storage ready");
        Ok(Self::with_object_store(Arc::new(store), config.object_ttl))
    }

    pub fn with_object_store(store: Arc<dyn ObjectStore>, object_ttl: Option<Duration>) -> Self {
        Self {
            inner: S3Storage::with_object_store(store, "storj"),
            object_ttl,
        }
    }

    /// Network-side expiry for an upload starting now. Independent of
    /// `Metadata::expires_at`, which stays authoritative for the app.
    fn expiry_hint(&self) -> Vec<(&'static str, String)> {
        self.object_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .map(|expires| vec![(OBJECT_EXPIRES_KEY, format_timestamp(expires))])
            .unwrap_or_default()
    }
}

/// Trade an access grant for S3 gateway credentials.
pub async fn register_access(auth_url: &str, access_grant: &str) -> StorageResult<GatewayCredentials> {
    let url = format!("{}/v1/access", auth_url.trim_end_matches('/'));
    let unavailable = |err: reqwest::Error| StorageError::BackendUnavailable {
        backend: "storj",
        op: "register access grant",
        id: auth_url.to_string(),
        source: Box::new(err),
    };

    reqwest::Client::new()
        .post(&url)
        .json(&RegisterAccessRequest {
            access_grant,
            public: false,
        })
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(unavailable)?
        .json::<GatewayCredentials>()
        .await
        .map_err(unavailable)
}

#[async_trait]
impl Storage for StorjStorage {
    async fn list(&self, ctx: &RequestContext) -> StorageResult<Vec<StoredObject>> {
        self.inner.list(ctx).await
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> StorageResult<ByteStream> {
        self.inner.get(ctx, id).await
    }

    async fn get_with_metadata(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> StorageResult<(ByteStream, Metadata)> {
        self.inner.get_with_metadata(ctx, id).await
    }

    async fn get_only_metadata(&self, ctx: &RequestContext, id: &str) -> StorageResult<Metadata> {
        self.inner.get_only_metadata(ctx, id).await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        id: &str,
        content: ByteStream,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.inner
            .put_with_attributes(ctx, id, content, metadata, &self.expiry_hint())
            .await
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> StorageResult<()> {
        self.inner.delete(ctx, id).await
    }

    fn storage_type(&self) -> &'static str {
        "storj"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::from_bytes;
    use object_store::{Attribute, memory::InMemory, path::Path as ObjectPath};
    use std::borrow::Cow;

    fn meta() -> Metadata {
        Metadata::new("notes.md", "text/markdown", 4, "", "")
    }

    #[tokio::test]
    async fn upload_carries_expiry_hint_separately_from_metadata() {
        let store = Arc::new(InMemory::new());
        let storage = StorjStorage::with_object_store(store.clone(), Some(Duration::from_secs(3600)));
        let ctx = RequestContext::background();
        storage.put(&ctx, "abc", from_bytes("data"), &meta()).await.unwrap();

        let result = store.get(&ObjectPath::from("abc")).await.unwrap();
        let hint = result
            .attributes
            .get(&Attribute::Metadata(Cow::Borrowed(OBJECT_EXPIRES_KEY)))
            .expect("expiry hint");
        let hinted = chrono::DateTime::parse_from_rfc3339(hint.as_ref()).unwrap();
        assert!(hinted > Utc::now());

        // The app-level expiry field is untouched by the hint.
        let stored = storage.get_only_metadata(&ctx, "abc").await.unwrap();
        assert_eq!(stored.expires_at, "");
        assert!(!stored.is_expired());
    }

    #[tokio::test]
    async fn no_ttl_means_no_hint() {
        let store = Arc::new(InMemory::new());
        let storage = StorjStorage::with_object_store(store.clone(), None);
        let ctx = RequestContext::background();
        storage.put(&ctx, "abc", from_bytes("data"), &meta()).await.unwrap();

        let result = store.get(&ObjectPath::from("abc")).await.unwrap();
        assert!(
            result
                .attributes
                .get(&Attribute::Metadata(Cow::Borrowed(OBJECT_EXPIRES_KEY)))
                .is_none()
        );
    }

    #[tokio::test]
    async fn absent_object_classifies_as_not_found() {
        let storage = StorjStorage::with_object_store(Arc::new(InMemory::new()), None);
        let ctx = RequestContext::background();
        let err = storage.get(&ctx, "missing").await.err().unwrap();
        assert!(storage.file_not_exists(&err));
        assert_eq!(storage.storage_type(), "storj");
    }

    #[tokio::test]
    async fn unreachable_auth_service_is_backend_unavailable() {
        let err = register_access("http://127.0.0.1:9", "1Abc").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::BackendUnavailable { backend: "storj", .. }
        ));
    }
}
