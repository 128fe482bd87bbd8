//! Helpers over [`ByteStream`].

use crate::error::StorageResult;
use crate::traits::ByteStream;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

/// Drain a stream into one buffer.
pub async fn collect_bytes(mut stream: ByteStream) -> StorageResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(piece) = stream.next().await {
        buf.extend_from_slice(&piece?);
    }
    Ok(buf.freeze())
}

/// Regroup a stream into pieces of exactly `size` bytes, except a shorter
/// final piece. Order is preserved.
pub fn rechunk(stream: ByteStream, size: usize) -> ByteStream {
    let size = size.max(1);
    let stream = async_stream::try_stream! {
        let mut stream = stream;
        let mut buf = BytesMut::with_capacity(size);
        while let Some(piece) = stream.next().await {
            let mut piece = piece?;
            while !piece.is_empty() {
                if buf.is_empty() && piece.len() >= size {
                    yield piece.split_to(size);
                    continue;
                }
                let take = (size - buf.len()).min(piece.len());
                buf.extend_from_slice(&piece.split_to(take));
                if buf.len() == size {
                    yield buf.split().freeze();
                }
            }
        }
        if !buf.is_empty() {
            yield buf.split().freeze();
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    fn stream_of(pieces: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures::stream::iter(
            pieces.into_iter().map(|p| Ok(Bytes::from_static(p))),
        ))
    }

    #[tokio::test]
    async fn test_collect() {
        let data = collect_bytes(stream_of(vec![b"ab", b"", b"cde"]))
            .await
            .unwrap();
        assert_eq!(&data[..], b"abcde");
    }

    #[tokio::test]
    async fn test_rechunk_regroups() {
        let pieces: Vec<Bytes> = rechunk(stream_of(vec![b"ab", b"cdefg", b"h", b"ijklmnop"]), 3)
            .map(|p| p.unwrap())
            .collect()
            .await;
        let pieces: Vec<&[u8]> = pieces.iter().map(|p| &p[..]).collect();
        assert_eq!(
            pieces,
            vec![&b"abc"[..], b"def", b"ghi", b"jkl", b"mno", b"p"]
        );
    }

    #[tokio::test]
    async fn test_rechunk_exact_multiple_has_no_empty_tail() {
        let pieces: Vec<Bytes> = rechunk(stream_of(vec![b"abcdef"]), 3)
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(pieces.len(), 2);
    }

    #[tokio::test]
    async fn test_rechunk_propagates_errors() {
        let failing: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(StorageError::NotFound("gone".into())),
        ]));
        let results: Vec<StorageResult<Bytes>> = rechunk(failing, 4).collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(StorageError::NotFound(_))));
    }
}
