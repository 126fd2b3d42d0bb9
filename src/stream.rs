//! Byte streams exchanged with the storage facade.

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Readable content. Dropping the stream closes the underlying handle.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// A single-chunk stream over in-memory content (e.g. pasted text).
pub fn from_bytes(content: impl Into<Bytes>) -> ByteStream {
    let content = content.into();
    futures::stream::once(async move { Ok(content) }).boxed()
}

pub fn from_reader<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    ReaderStream::new(reader).boxed()
}

/// Drain a stream into memory.
pub async fn read_to_end(stream: ByteStream) -> io::Result<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunks_are_concatenated() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hel")),
            Ok(Bytes::from_static(b"lo")),
        ];
        let stream: ByteStream = futures::stream::iter(chunks).boxed();
        assert_eq!(read_to_end(stream).await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn reader_errors_surface() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ];
        let stream: ByteStream = futures::stream::iter(chunks).boxed();
        assert!(read_to_end(stream).await.is_err());
    }

    #[tokio::test]
    async fn from_reader_streams_everything() {
        let stream = from_reader(std::io::Cursor::new(b"abc".to_vec()));
        assert_eq!(read_to_end(stream).await.unwrap(), Bytes::from_static(b"abc"));
    }
}
