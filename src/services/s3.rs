//! src/services/s3.rs
//!
//! S3Storage stores each object as a single key whose user-defined
//! attributes carry the metadata, so content and metadata land in one
//! request. Metadata is read back with a head-only request.

use crate::{
    config::S3Config,
    context::RequestContext,
    errors::{StorageError, StorageResult},
    models::{Metadata, StoredObject},
    services::storage::Storage,
    stream::ByteStream,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, GetResult, ObjectStore, PutMultipartOpts,
    WriteMultipart, aws::AmazonS3Builder, path::Path as ObjectPath,
};
use std::{borrow::Cow, io, sync::Arc};
use tracing::{debug, info, warn};

const LIST_HEAD_CONCURRENCY: usize = 8;
const UPLOAD_CONCURRENCY: usize = 4;

#[derive(Clone, Debug)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    /// Reported by `storage_type` and used in error context.
    label: &'static str,
}

impl S3Storage {
    /// Build a client for an S3-compatible endpoint. Credentials are fixed
    /// for the lifetime of the backend.
    pub fn new(config: &S3Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("S3 bucket is required".into()));
        }

        let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if let Some(token) = &config.session_token {
            builder = builder.with_token(token);
        }
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build S3 store: {}", e)))?;
        info!(bucket = %config.bucket, endpoint = ?config.endpoint_url, "S3 storage ready");
        Ok(Self::with_object_store(Arc::new(store), "s3"))
    }

    /// Wrap an existing store, e.g. an in-memory one in tests or a gateway
    /// client for another backend.
    pub fn with_object_store(store: Arc<dyn ObjectStore>, label: &'static str) -> Self {
        Self { store, label }
    }

    fn path(id: &str) -> StorageResult<ObjectPath> {
        ObjectPath::parse(id).map_err(|err| StorageError::InvalidIdentifier {
            id: id.to_string(),
            reason: err.to_string(),
        })
    }

    fn map_err(&self, op: &'static str, id: &str, err: object_store::Error) -> StorageError {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound { id: id.to_string() },
            other => StorageError::BackendUnavailable {
                backend: self.label,
                op,
                id: id.to_string(),
                source: Box::new(other),
            },
        }
    }

    fn decode_attributes(id: &str, attributes: &Attributes) -> StorageResult<Metadata> {
        let pairs = attributes
            .iter()
            .filter_map(|(attr, value)| -> Option<(&str, &str)> {
                match attr {
                    Attribute::Metadata(key) => Some((key.as_ref(), value.as_ref())),
                    _ => None,
                }
            });
        Metadata::from_attribute_pairs(id, pairs)
    }

    fn encode_attributes(metadata: &Metadata, extra: &[(&'static str, String)]) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(metadata.content_type.clone()),
        );
        for (key, value) in metadata.to_attribute_pairs().into_iter().chain(
            extra.iter().map(|(key, value)| (*key, value.clone())),
        ) {
            attributes.insert(
                Attribute::Metadata(Cow::Borrowed(key)),
                AttributeValue::from(value),
            );
        }
        attributes
    }

    async fn head(&self, id: &str) -> StorageResult<Metadata> {
        let path = Self::path(id)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .store
            .get_opts(&path, options)
            .await
            .map_err(|err| self.map_err("head", id, err))?;
        Self::decode_attributes(id, &result.attributes)
    }

    async fn fetch(&self, id: &str) -> StorageResult<GetResult> {
        let path = Self::path(id)?;
        self.store
            .get(&path)
            .await
            .map_err(|err| self.map_err("get", id, err))
    }

    fn body(result: GetResult) -> ByteStream {
        result.into_stream().map_err(io::Error::other).boxed()
    }

    /// Upload `content` as a multipart object carrying `metadata` plus any
    /// backend-specific `extra` attributes.
    ///
    /// Streaming the body is raced against `ctx`; if it fails or is
    /// cancelled the upload is aborted so no orphaned parts remain. Once
    /// the body is fully streamed, completion is not interrupted.
    pub(crate) async fn put_with_attributes(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut content: ByteStream,
        metadata: &Metadata,
        extra: &[(&'static str, String)],
    ) -> StorageResult<()> {
        let path = Self::path(id)?;
        let opts = PutMultipartOpts {
            attributes: Self::encode_attributes(metadata, extra),
            ..Default::default()
        };

        let upload = ctx
            .run(async {
                self.store
                    .put_multipart_opts(&path, opts)
                    .await
                    .map_err(|err| self.map_err("put", id, err))
            })
            .await?;
        let mut writer = WriteMultipart::new(upload);

        let mut size: u64 = 0;
        let streamed = ctx
            .run(async {
                while let Some(chunk) = content.next().await {
                    let chunk = chunk.map_err(|err| StorageError::io("put", id, err))?;
                    writer
                        .wait_for_capacity(UPLOAD_CONCURRENCY)
                        .await
                        .map_err(|err| self.map_err("put", id, err))?;
                    size += chunk.len() as u64;
                    writer.put(chunk);
                }
                Ok(())
            })
            .await;

        if let Err(err) = streamed {
            if let Err(abort_err) = writer.abort().await {
                warn!(backend = self.label, id, error = %abort_err, "failed to abort multipart upload");
            }
            return Err(err);
        }

        writer
            .finish()
            .await
            .map_err(|err| self.map_err("put", id, err))?;
        debug!(backend = self.label, id, size, "stored object");
        Ok(())
    }

    async fn list_objects(&self, ctx: &RequestContext) -> StorageResult<Vec<StoredObject>> {
        let keys: Vec<String> = self
            .store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|err| self.map_err("list", "*", err))?;

        let heads = futures::stream::iter(keys)
            .map(|id| async move {
                if let Some(err) = ctx.err() {
                    return Err(err);
                }
                match self.head(&id).await {
                    Ok(metadata) => Ok(Some(StoredObject::new(id, metadata))),
                    // Deleted between listing and head.
                    Err(StorageError::NotFound { .. }) => Ok(None),
                    Err(err @ StorageError::CorruptMetadata { .. }) => {
                        warn!(backend = self.label, id = %id, error = %err, "skipping object without usable metadata");
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            })
            .buffer_unordered(LIST_HEAD_CONCURRENCY);

        let objects: Vec<Option<StoredObject>> = heads.try_collect().await?;
        Ok(objects.into_iter().flatten().collect())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn list(&self, ctx: &RequestContext) -> StorageResult<Vec<StoredObject>> {
        ctx.run(self.list_objects(ctx)).await
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> StorageResult<ByteStream> {
        let result = ctx.run(self.fetch(id)).await?;
        Ok(Self::body(result))
    }

    async fn get_with_metadata(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> StorageResult<(ByteStream, Metadata)> {
        let result = ctx.run(self.fetch(id)).await?;
        let metadata = Self::decode_attributes(id, &result.attributes)?;
        Ok((Self::body(result), metadata))
    }

    async fn get_only_metadata(&self, ctx: &RequestContext, id: &str) -> StorageResult<Metadata> {
        ctx.run(self.head(id)).await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        id: &str,
        content: ByteStream,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.put_with_attributes(ctx, id, content, metadata, &[]).await
    }

    /// Object stores acknowledge deletes of absent keys, so existence is
    /// checked first to keep `NotFound` observable.
    async fn delete(&self, ctx: &RequestContext, id: &str) -> StorageResult<()> {
        let path = Self::path(id)?;
        ctx.run(async {
            self.store
                .head(&path)
                .await
                .map_err(|err| self.map_err("delete", id, err))?;
            self.store
                .delete(&path)
                .await
                .map_err(|err| self.map_err("delete", id, err))?;
            debug!(backend = self.label, id, "deleted object");
            Ok(())
        })
        .await
    }

    fn storage_type(&self) -> &'static str {
        self.label
    }
}
