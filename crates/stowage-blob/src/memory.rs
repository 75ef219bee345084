use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use stowage_crypto::{digests_match, DigestAlgorithm, HashingReader};
use stowage_types::{CleanupObserver, TracingCleanupObserver};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::traits::{Backend, BlobSource, StoredBlob};
use crate::verify::{check_size, reject_mismatch};

/// In-memory, HashMap-based blob container.
///
/// Intended for tests and embedding. The upload is buffered and checked
/// before it is inserted, so a rejected put never replaces or exposes
/// anything. The mismatch is still reported to the observer as a
/// completed cleanup.
pub struct InMemoryBackend {
    objects: RwLock<HashMap<String, Bytes>>,
    algorithm: DigestAlgorithm,
    observer: Arc<dyn CleanupObserver>,
}

impl InMemoryBackend {
    /// Create an empty container verifying with SHA-384.
    pub fn new() -> Self {
        Self::with_algorithm(DigestAlgorithm::default())
    }

    pub fn with_algorithm(algorithm: DigestAlgorithm) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            algorithm,
            observer: Arc::new(TracingCleanupObserver),
        }
    }

    /// Report cleanup outcomes to `observer` instead of the log only.
    pub fn with_observer(mut self, observer: Arc<dyn CleanupObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of stored names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn poisoned(op: &str) -> BlobError {
        BlobError::backend(
            format!("{op} in-memory container"),
            "lock poisoned".to_string(),
        )
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("object_count", &self.len())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn get(&self, name: &str) -> BlobResult<StoredBlob> {
        let objects = self.objects.read().map_err(|_| Self::poisoned("read"))?;
        let data = objects.get(name).cloned().ok_or_else(|| BlobError::NotFound {
            name: name.to_string(),
        })?;
        let size = data.len() as u64;
        Ok(StoredBlob::new(Box::new(Cursor::new(data)), size))
    }

    async fn put(
        &self,
        name: &str,
        reader: BlobSource<'_>,
        size: u64,
        expected_hash: &str,
    ) -> BlobResult<()> {
        let mut hashing = HashingReader::new(reader.take(size), self.algorithm);
        let mut data = Vec::new();
        hashing
            .read_to_end(&mut data)
            .await
            .map_err(|e| BlobError::backend(format!("read upload for {name}"), e))?;
        let (computed, written) = hashing.finish();
        check_size(name, size, written)?;

        if !digests_match(expected_hash, &computed) {
            let nothing_stored: Result<(), BlobError> = Ok(());
            return Err(reject_mismatch(
                self.observer.as_ref(),
                name,
                expected_hash,
                computed,
                &nothing_stored,
            ));
        }

        self.objects
            .write()
            .map_err(|_| Self::poisoned("write"))?
            .insert(name.to_string(), Bytes::from(data));
        debug!(blob = name, digest = %computed, "blob stored");
        Ok(())
    }

    async fn remove(&self, name: &str) -> BlobResult<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned("write"))?;
        match objects.remove(name) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}
