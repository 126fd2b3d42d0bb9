//! Behaviour every backend must share, exercised through `dyn Storage`.

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use fileshelf::{
    Metadata, RequestContext, Storage, StorageError,
    models::metadata::{compute_expires_at_from, format_timestamp},
    password,
    services::{LocalStorage, S3Storage, StorjStorage, allocator::allocate_id},
    stream::{from_bytes, read_to_end},
};
use object_store::memory::InMemory;
use std::sync::Arc;
use tempfile::TempDir;

struct Backend {
    storage: Arc<dyn Storage>,
    _dir: Option<TempDir>,
}

fn backends() -> Vec<Backend> {
    let dir = TempDir::new().unwrap();
    vec![
        Backend {
            storage: Arc::new(LocalStorage::new(dir.path().join("uploads"))),
            _dir: Some(dir),
        },
        Backend {
            storage: Arc::new(S3Storage::with_object_store(Arc::new(InMemory::new()), "s3")),
            _dir: None,
        },
        Backend {
            storage: Arc::new(StorjStorage::with_object_store(Arc::new(InMemory::new()), None)),
            _dir: None,
        },
    ]
}

fn text_meta(filename: &str, body: &str, expires_at: &str) -> Metadata {
    Metadata {
        filename: filename.into(),
        content_type: "text/plain".into(),
        content_length: body.len().to_string(),
        password_hash: String::new(),
        expires_at: expires_at.into(),
        delete_token: String::new(),
    }
}

#[tokio::test]
async fn hello_scenario() {
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        let label = storage.storage_type();

        storage
            .put(&ctx, "abc123def456", from_bytes("hello"), &text_meta("x.txt", "hello", ""))
            .await
            .unwrap();
        let body = read_to_end(storage.get(&ctx, "abc123def456").await.unwrap())
            .await
            .unwrap();
        assert_eq!(body, Bytes::from_static(b"hello"), "{label}");
        assert_eq!(body.len(), 5);

        storage.delete(&ctx, "abc123def456").await.unwrap();
        let err = storage.get(&ctx, "abc123def456").await.err().unwrap();
        assert!(storage.file_not_exists(&err), "{label}: {err}");
        let err = storage.get_only_metadata(&ctx, "abc123def456").await.unwrap_err();
        assert!(storage.file_not_exists(&err), "{label}: {err}");
    }
}

#[tokio::test]
async fn round_trip_preserves_bytes_and_every_field() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
    let hash = password::hash_password("open sesame").unwrap();
    let meta = Metadata::new(
        "../photos/cat.bin",
        "application/octet-stream",
        payload.len() as u64,
        hash,
        compute_expires_at_from(Utc::now(), 6),
    )
    .with_delete_token("tokentokentoken1");

    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        storage
            .put(&ctx, "roundtrip01", from_bytes(payload.clone()), &meta)
            .await
            .unwrap();

        let (body, got) = storage.get_with_metadata(&ctx, "roundtrip01").await.unwrap();
        assert_eq!(read_to_end(body).await.unwrap().as_ref(), payload.as_slice());
        assert_eq!(got, meta, "{}", storage.storage_type());
        assert_eq!(got.filename, "cat.bin");
        assert!(password::verify_password("open sesame", &got.password_hash));
        assert!(got.authorizes_delete("tokentokentoken1"));
        assert_eq!(storage.get_only_metadata(&ctx, "roundtrip01").await.unwrap(), meta);
    }
}

#[tokio::test]
async fn empty_content_round_trips() {
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        storage
            .put(&ctx, "empty", from_bytes(Bytes::new()), &text_meta("e", "", ""))
            .await
            .unwrap();
        let body = read_to_end(storage.get(&ctx, "empty").await.unwrap()).await.unwrap();
        assert!(body.is_empty(), "{}", storage.storage_type());
    }
}

#[tokio::test]
async fn never_written_identifier_is_absent() {
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        let err = storage.get(&ctx, "neverwritten").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert!(storage.file_not_exists(&err));
        let err = storage.get_with_metadata(&ctx, "neverwritten").await.err().unwrap();
        assert!(storage.file_not_exists(&err));
        let err = storage.delete(&ctx, "neverwritten").await.unwrap_err();
        assert!(storage.file_not_exists(&err));

        for other in [
            StorageError::Cancelled,
            StorageError::DeadlineExceeded,
            StorageError::CorruptMetadata {
                id: "x".into(),
                reason: "bad".into(),
            },
        ] {
            assert!(!storage.file_not_exists(&other));
        }
    }
}

#[tokio::test]
async fn listing_shows_only_user_objects() {
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        assert!(storage.list(&ctx).await.unwrap().is_empty());

        storage
            .put(&ctx, "a", from_bytes("x"), &text_meta("a.txt", "x", ""))
            .await
            .unwrap();
        let listed = storage.list(&ctx).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["a"], "{}", storage.storage_type());
        assert_eq!(listed[0].metadata.filename, "a.txt");
    }
}

#[tokio::test]
async fn sweep_selects_only_past_deadlines() {
    let now = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        let past = format_timestamp(now - Duration::hours(1));
        let future = format_timestamp(now + Duration::hours(1));
        storage
            .put(&ctx, "past", from_bytes("p"), &text_meta("p", "p", &past))
            .await
            .unwrap();
        storage
            .put(&ctx, "future", from_bytes("f"), &text_meta("f", "f", &future))
            .await
            .unwrap();
        storage
            .put(&ctx, "never", from_bytes("n"), &text_meta("n", "n", ""))
            .await
            .unwrap();

        assert_eq!(storage.delete_expired_at(&ctx, now).await.unwrap(), 1);
        let err = storage.get(&ctx, "past").await.err().unwrap();
        assert!(storage.file_not_exists(&err));
        assert!(storage.get_with_metadata(&ctx, "future").await.is_ok());
        assert!(storage.get_with_metadata(&ctx, "never").await.is_ok());

        // Nothing left to purge at the same instant.
        assert_eq!(storage.delete_expired_at(&ctx, now).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn allocation_avoids_live_objects() {
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        let id = allocate_id(storage.as_ref(), &ctx).await.unwrap();
        storage
            .put(&ctx, &id, from_bytes("x"), &text_meta("x", "x", ""))
            .await
            .unwrap();
        let next = allocate_id(storage.as_ref(), &ctx).await.unwrap();
        assert_ne!(id, next);
    }
}

#[tokio::test]
async fn cancelled_context_never_reads_as_absent() {
    for backend in backends() {
        let storage = backend.storage;
        let ctx = RequestContext::background();
        ctx.cancel();
        let err = storage.get(&ctx, "whatever").await.err().unwrap();
        assert!(matches!(err, StorageError::Cancelled));
        assert!(!storage.file_not_exists(&err));
        let err = storage.delete_expired(&ctx).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
