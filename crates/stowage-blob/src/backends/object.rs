//! Blob container on top of `object_store`.
//!
//! Works with any store `object_store` can open from a URL: `s3://`,
//! `gs://`, `az://`, `file://` and `memory://`. Uploads are streamed through
//! a multipart writer while being hashed; a mismatched object is deleted
//! again after the upload completes.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::buffered::BufReader;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use stowage_crypto::{DigestAlgorithm, HashingReader};
use stowage_types::{CleanupObserver, TracingCleanupObserver};
use tokio::io::AsyncReadExt;
use tracing::debug;
use url::Url;

use crate::error::{BlobError, BlobResult};
use crate::traits::{Backend, BlobSource, StoredBlob};
use crate::verify::{check_size, verify_or_discard};

/// Read buffer size for uploads.
const CHUNK_SIZE: usize = 64 * 1024;
/// Parts allowed in flight before the upload waits.
const MAX_IN_FLIGHT_PARTS: usize = 8;

/// Blob container backed by an [`ObjectStore`] under a fixed prefix.
#[derive(Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    algorithm: DigestAlgorithm,
    observer: Arc<dyn CleanupObserver>,
}

impl ObjectStoreBackend {
    /// Wrap an existing store. Blobs live under `prefix`.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Path) -> Self {
        Self {
            store,
            prefix,
            algorithm: DigestAlgorithm::default(),
            observer: Arc::new(TracingCleanupObserver),
        }
    }

    /// Open the store named by `url`; the URL path becomes the container
    /// prefix. `options` are passed to the store builder (credentials,
    /// region, endpoint).
    pub fn from_url<I, K, V>(url: &str, options: I) -> BlobResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let parsed = url
            .parse::<Url>()
            .map_err(|e| BlobError::Config(format!("invalid object store url {url:?}: {e}")))?;
        let (store, prefix) = object_store::parse_url_opts(&parsed, options)
            .map_err(|e| BlobError::Config(format!("cannot open object store {url:?}: {e}")))?;
        debug!(%url, prefix = %prefix, "opened object store container");
        Ok(Self::new(Arc::from(store), prefix))
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CleanupObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn location(&self, name: &str) -> BlobResult<Path> {
        if name.is_empty() {
            return Err(BlobError::InvalidName {
                name: String::new(),
                reason: "blob name must not be empty".into(),
            });
        }
        Ok(self.prefix.child(name))
    }

    async fn upload(
        &self,
        name: &str,
        location: &Path,
        reader: BlobSource<'_>,
        size: u64,
    ) -> BlobResult<String> {
        let mut hashing = HashingReader::new(reader.take(size), self.algorithm);

        // Some stores reject a multipart upload with no parts.
        if size == 0 {
            self.store
                .put(location, PutPayload::new())
                .await
                .map_err(|e| store_error(name, "put", e))?;
            return Ok(hashing.finish().0);
        }

        let upload = self
            .store
            .put_multipart(location)
            .await
            .map_err(|e| store_error(name, "start upload", e))?;
        let mut writer = WriteMultipart::new(upload);
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = match hashing.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    abort(name, writer).await;
                    return Err(BlobError::backend(format!("read upload for {name}"), e));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await {
                abort(name, writer).await;
                return Err(store_error(name, "upload part", e));
            }
            writer.write(&buf[..n]);
        }

        let (computed, written) = hashing.finish();
        if let Err(e) = check_size(name, size, written) {
            abort(name, writer).await;
            return Err(e);
        }
        writer
            .finish()
            .await
            .map_err(|e| store_error(name, "complete upload", e))?;
        Ok(computed)
    }
}

/// Abandon a multipart upload that will not be completed.
async fn abort(name: &str, writer: WriteMultipart) {
    if let Err(e) = writer.abort().await {
        debug!(blob = name, error = %e, "could not abort multipart upload");
    }
}

/// Normalise an `object_store` error for `name`.
fn store_error(name: &str, op: &str, err: object_store::Error) -> BlobError {
    match err {
        object_store::Error::NotFound { .. } => BlobError::NotFound {
            name: name.to_string(),
        },
        other => BlobError::backend(format!("{op} {name}"), other),
    }
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn get(&self, name: &str) -> BlobResult<StoredBlob> {
        let location = self.location(name)?;
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| store_error(name, "head", e))?;
        let size = meta.size;
        let reader = BufReader::new(Arc::clone(&self.store), &meta);
        Ok(StoredBlob::new(Box::new(reader), size))
    }

    async fn put(
        &self,
        name: &str,
        reader: BlobSource<'_>,
        size: u64,
        expected_hash: &str,
    ) -> BlobResult<()> {
        let location = self.location(name)?;
        let computed = self.upload(name, &location, reader, size).await?;
        verify_or_discard(self, self.observer.as_ref(), name, expected_hash, computed).await
    }

    async fn remove(&self, name: &str) -> BlobResult<()> {
        let location = self.location(name)?;
        // Not every store reports a missing object on delete.
        self.store
            .head(&location)
            .await
            .map_err(|e| store_error(name, "head", e))?;
        self.store
            .delete(&location)
            .await
            .map_err(|e| store_error(name, "delete", e))
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}
