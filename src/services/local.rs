//! src/services/local.rs
//!
//! LocalStorage keeps each object as two files under one base directory:
//! `{base}/{id}` holds the raw bytes and `{base}/{id}.metadata` holds the
//! JSON sidecar. Both are written through a temp file and renamed into
//! place, content first. Errors and cancellation unwind both halves; only a
//! crash between the two renames can leave content without a sidecar. Reads
//! report that as corrupt metadata and listings skip it. A sidecar without
//! content is treated as absent.

use crate::{
    context::RequestContext,
    errors::{StorageError, StorageResult},
    models::{Metadata, StoredObject},
    services::storage::Storage,
    stream::ByteStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

pub const METADATA_SUFFIX: &str = ".metadata";
const TMP_PREFIX: &str = ".tmp-";
const MAX_ID_LEN: usize = 255 - METADATA_SUFFIX.len();

/// Removes its paths when dropped unless disarmed. Dropping happens on
/// error returns and when `RequestContext::run` abandons a write.
struct RemoveOnDrop {
    paths: Vec<PathBuf>,
}

impl RemoveOnDrop {
    fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    fn disarm(mut self) {
        self.paths.clear();
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed unfinished write"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove unfinished write");
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocalStorage {
    /// Directory holding content files and their sidecars.
    base_path: PathBuf,
}

impl LocalStorage {
    /// The directory is created lazily on the first `put`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Reject identifiers that could escape the base directory or collide
    /// with sidecars and temp files.
    fn ensure_id_safe(id: &str) -> StorageResult<()> {
        let reason = if id.is_empty() {
            Some("empty")
        } else if id.len() > MAX_ID_LEN {
            Some("too long")
        } else if id.starts_with('.') {
            Some("leading dot")
        } else if id.ends_with(METADATA_SUFFIX) {
            Some("reserved suffix")
        } else if id
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            Some("path separator or control byte")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(StorageError::InvalidIdentifier {
                id: id.to_string(),
                reason: reason.into(),
            }),
            None => Ok(()),
        }
    }

    fn content_path(&self, id: &str) -> PathBuf {
        self.base_path.join(id)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}{}", id, METADATA_SUFFIX))
    }

    fn is_internal_name(name: &str) -> bool {
        name.starts_with(TMP_PREFIX) || name.ends_with(METADATA_SUFFIX)
    }

    async fn open_content(&self, id: &str) -> StorageResult<File> {
        Self::ensure_id_safe(id)?;
        File::open(self.content_path(id))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StorageError::NotFound { id: id.to_string() },
                _ => StorageError::io("open content", id, err),
            })
    }

    /// Read and decode the sidecar. The object exists only while its content
    /// does: a sidecar alone is absence, content alone is corruption.
    async fn read_metadata(&self, id: &str) -> StorageResult<Metadata> {
        Self::ensure_id_safe(id)?;
        match fs::try_exists(self.content_path(id)).await {
            Ok(true) => {}
            Ok(false) => return Err(StorageError::NotFound { id: id.to_string() }),
            Err(err) => return Err(StorageError::io("stat content", id, err)),
        }
        match fs::read(self.metadata_path(id)).await {
            Ok(raw) => Metadata::from_sidecar(id, &raw),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::corrupt(id, "metadata record missing"))
            }
            Err(err) => Err(StorageError::io("read metadata", id, err)),
        }
    }

    /// Stream `chunks` into a temp file beside `dest`, fsync, then rename it
    /// over `dest`. The temp file is removed on failure or if the future is
    /// dropped before the rename.
    async fn write_atomically(
        &self,
        id: &str,
        dest: &Path,
        mut chunks: ByteStream,
    ) -> StorageResult<u64> {
        let tmp_path = self
            .base_path
            .join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));
        let mut file = File::create(&tmp_path)
            .await
            .map_err(|err| StorageError::io("create temp file", id, err))?;
        let guard = RemoveOnDrop::new([tmp_path.clone()]);

        let mut written: u64 = 0;
        let result: io::Result<()> = async {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        drop(file);

        result.map_err(|err| StorageError::io("write", id, err))?;
        fs::rename(&tmp_path, dest)
            .await
            .map_err(|err| StorageError::io("rename", id, err))?;
        guard.disarm();
        Ok(written)
    }

    async fn list_entries(&self) -> StorageResult<Vec<StoredObject>> {
        let mut dir = match fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            // Nothing uploaded yet.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io("list", self.base_path.display().to_string(), err)),
        };

        let mut objects = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    return Err(StorageError::io("list", self.base_path.display().to_string(), err));
                }
            };
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| StorageError::io("list", entry.path().display().to_string(), err))?;
            if !file_type.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if Self::is_internal_name(&name) {
                continue;
            }

            match self.read_metadata(&name).await {
                Ok(metadata) => objects.push(StoredObject::new(name, metadata)),
                // Removed by a concurrent delete since read_dir saw it.
                Err(StorageError::NotFound { .. }) => {}
                Err(err @ (StorageError::CorruptMetadata { .. } | StorageError::InvalidIdentifier { .. })) => {
                    warn!(id = %name, error = %err, "skipping object without usable metadata");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(objects)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, ctx: &RequestContext) -> StorageResult<Vec<StoredObject>> {
        ctx.run(self.list_entries()).await
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> StorageResult<ByteStream> {
        let file = ctx.run(self.open_content(id)).await?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn get_with_metadata(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> StorageResult<(ByteStream, Metadata)> {
        ctx.run(async {
            let file = self.open_content(id).await?;
            let metadata = match self.read_metadata(id).await {
                Err(StorageError::NotFound { .. }) => {
                    Err(StorageError::corrupt(id, "metadata record missing"))
                }
                other => other,
            }?;
            Ok((ReaderStream::new(file).boxed(), metadata))
        })
        .await
    }

    async fn get_only_metadata(&self, ctx: &RequestContext, id: &str) -> StorageResult<Metadata> {
        ctx.run(self.read_metadata(id)).await
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        id: &str,
        content: ByteStream,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        Self::ensure_id_safe(id)?;
        let sidecar = metadata
            .to_sidecar()
            .map_err(|err| StorageError::corrupt(id, err.to_string()))?;

        ctx.run(async {
            fs::create_dir_all(&self.base_path)
                .await
                .map_err(|err| StorageError::io("create base directory", id, err))?;

            let content_path = self.content_path(id);
            let metadata_path = self.metadata_path(id);
            let size = self.write_atomically(id, &content_path, content).await?;

            // New content is in place; until its sidecar lands, neither half
            // (nor a sidecar left by an overwritten object) may survive.
            let pending = RemoveOnDrop::new([content_path.clone(), metadata_path.clone()]);
            let sidecar_stream = crate::stream::from_bytes(sidecar);
            self.write_atomically(id, &metadata_path, sidecar_stream).await?;
            pending.disarm();

            debug!(id, size, path = %content_path.display(), "stored object");
            Ok(())
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> StorageResult<()> {
        Self::ensure_id_safe(id)?;
        ctx.run(async {
            match fs::remove_file(self.content_path(id)).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    // Still reclaim a sidecar left without its content.
                    return match fs::remove_file(self.metadata_path(id)).await {
                        Ok(()) => {
                            warn!(id, "content missing, removed orphaned metadata record");
                            Err(StorageError::NotFound { id: id.to_string() })
                        }
                        Err(err) if err.kind() == ErrorKind::NotFound => {
                            Err(StorageError::NotFound { id: id.to_string() })
                        }
                        Err(err) => Err(StorageError::io("delete metadata", id, err)),
                    };
                }
                Err(err) => return Err(StorageError::io("delete content", id, err)),
            }

            match fs::remove_file(self.metadata_path(id)).await {
                Ok(()) => {
                    debug!(id, "removed object and metadata");
                    Ok(())
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    Err(StorageError::corrupt(id, "metadata record missing"))
                }
                Err(err) => Err(StorageError::io("delete metadata", id, err)),
            }
        })
        .await
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
