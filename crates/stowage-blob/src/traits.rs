use std::fmt;

use async_trait::async_trait;
use stowage_crypto::DigestAlgorithm;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};

use crate::error::{BlobError, BlobResult};

/// A readable, seekable blob body.
pub trait BlobRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> BlobRead for T {}

/// The upload stream handed to [`Backend::put`].
pub type BlobSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// A blob returned by [`Backend::get`].
pub struct StoredBlob {
    pub reader: Box<dyn BlobRead>,
    pub size: u64,
}

impl StoredBlob {
    pub fn new(reader: Box<dyn BlobRead>, size: u64) -> Self {
        Self { reader, size }
    }

    /// Read the whole body into memory.
    pub async fn read_to_vec(mut self, name: &str) -> BlobResult<Vec<u8>> {
        let mut data = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        self.reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| BlobError::backend(format!("read blob {name}"), e))?;
        Ok(data)
    }
}

impl fmt::Debug for StoredBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredBlob")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Named blob storage within one container.
///
/// All implementations must satisfy these invariants:
/// - A blob is visible to `get` only once its digest has been verified.
/// - `get` and `remove` report a missing blob as [`BlobError::NotFound`],
///   whatever the backend calls it.
/// - `put` never buffers the whole payload to verify it.
/// - Cleanup failures are reported to the backend's cleanup observer and
///   never replace the error returned to the caller.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open the named blob for reading.
    ///
    /// Returns [`BlobError::NotFound`] if the name is absent.
    async fn get(&self, name: &str) -> BlobResult<StoredBlob>;

    /// Write `size` bytes from `reader` under `name`, verifying them against
    /// `expected_hash` (hex, in this backend's [`DigestAlgorithm`]).
    ///
    /// On a digest mismatch the written object is removed on a best-effort
    /// basis and [`BlobError::HashMismatch`] is returned. A write failure is
    /// returned as-is, with no cleanup guaranteed.
    async fn put(
        &self,
        name: &str,
        reader: BlobSource<'_>,
        size: u64,
        expected_hash: &str,
    ) -> BlobResult<()>;

    /// Delete the named blob.
    ///
    /// Returns [`BlobError::NotFound`] if the name is absent.
    async fn remove(&self, name: &str) -> BlobResult<()>;

    /// The digest algorithm `put` verifies with.
    fn digest_algorithm(&self) -> DigestAlgorithm;
}
