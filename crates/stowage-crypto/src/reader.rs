use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use crate::digest::{DigestAlgorithm, StreamingDigest};

/// An [`AsyncRead`] adaptor that feeds every byte it yields into a digest.
///
/// Wrap the upload stream in a `HashingReader`, hand it to whatever writes
/// to the backend, then call [`finish`](Self::finish) to get the digest of
/// exactly the bytes that were read.
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    digest: StreamingDigest,
    bytes_read: u64,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            digest: algorithm.start(),
            bytes_read: 0,
        }
    }

    /// Bytes passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the reader, returning the hex digest and byte count.
    pub fn finish(self) -> (String, u64) {
        (self.digest.finalize_hex(), self.bytes_read)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let fresh = &buf.filled()[before..];
                this.digest.update(fresh);
                this.bytes_read += fresh.len() as u64;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn digest_matches_one_shot_hash() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let mut reader = HashingReader::new(&payload[..], DigestAlgorithm::Sha384);

        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        assert_eq!(sink, payload);

        let (hex, n) = reader.finish();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(hex, DigestAlgorithm::Sha384.hash_hex(&payload));
    }

    #[tokio::test]
    async fn only_consumed_bytes_are_hashed() {
        let payload = b"0123456789".to_vec();
        let limited = (&payload[..]).take(4);
        let mut reader = HashingReader::new(limited, DigestAlgorithm::Sha256);

        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();

        let (hex, n) = reader.finish();
        assert_eq!(n, 4);
        assert_eq!(hex, DigestAlgorithm::Sha256.hash_hex(b"0123"));
    }

    #[tokio::test]
    async fn empty_stream() {
        let mut reader = HashingReader::new(tokio::io::empty(), DigestAlgorithm::Blake3);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        assert_eq!(reader.bytes_read(), 0);
        assert_eq!(reader.finish().0, DigestAlgorithm::Blake3.hash_hex(b""));
    }
}
