//! Local filesystem blob container.
//!
//! Each blob is a file under the container root; `/` in a name becomes a
//! subdirectory. With staged writes enabled (the default) `put` writes to a
//! temporary file next to the destination and renames it into place only
//! after the digest has been verified, so a blob that fails verification or
//! whose upload is interrupted is never visible under its final name. With
//! staged writes disabled the backend follows the same write, verify, then
//! delete-on-mismatch flow as the other backends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use stowage_crypto::{digests_match, DigestAlgorithm, HashingReader};
use stowage_types::{CleanupObserver, TracingCleanupObserver};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::names::validate_blob_name;
use crate::traits::{Backend, BlobSource, StoredBlob};
use crate::verify::{check_size, reject_mismatch, verify_or_discard};

/// Blob container rooted at a local directory.
#[derive(Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
    algorithm: DigestAlgorithm,
    staged_writes: bool,
    observer: Arc<dyn CleanupObserver>,
}

impl FilesystemBackend {
    /// Open (creating if needed) a container at `root`.
    pub fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            BlobError::backend(format!("create container {}", root.display()), e)
        })?;
        Ok(Self {
            root,
            algorithm: DigestAlgorithm::default(),
            staged_writes: true,
            observer: Arc::new(TracingCleanupObserver),
        })
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Toggle staging. `false` writes straight to the final path.
    pub fn with_staged_writes(mut self, staged: bool) -> Self {
        self.staged_writes = staged;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CleanupObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> BlobResult<PathBuf> {
        validate_blob_name(name)?;
        Ok(self.root.join(name))
    }

    async fn ensure_parent(&self, name: &str, path: &Path) -> BlobResult<PathBuf> {
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| BlobError::backend(format!("create directory for {name}"), e))?;
        Ok(parent)
    }

    /// Copy exactly `size` bytes from `reader` into `file`, returning the
    /// computed digest.
    async fn copy_hashed(
        &self,
        name: &str,
        reader: BlobSource<'_>,
        size: u64,
        file: &mut tokio::fs::File,
    ) -> BlobResult<String> {
        let mut hashing = HashingReader::new(reader.take(size), self.algorithm);
        tokio::io::copy(&mut hashing, file)
            .await
            .map_err(|e| BlobError::backend(format!("write {name}"), e))?;
        file.flush()
            .await
            .map_err(|e| BlobError::backend(format!("flush {name}"), e))?;
        file.sync_all()
            .await
            .map_err(|e| BlobError::backend(format!("sync {name}"), e))?;
        let (computed, written) = hashing.finish();
        check_size(name, size, written)?;
        Ok(computed)
    }

    async fn put_staged(
        &self,
        name: &str,
        path: PathBuf,
        reader: BlobSource<'_>,
        size: u64,
        expected_hash: &str,
    ) -> BlobResult<()> {
        let parent = self.ensure_parent(name, &path).await?;
        let staging = blocking(format!("create staging file for {name}"), move || {
            tempfile::Builder::new().prefix(".stage-").tempfile_in(&parent)
        })
        .await?;
        let (std_file, staging_path) = staging.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let computed = match self.copy_hashed(name, reader, size, &mut file).await {
            Ok(computed) => computed,
            Err(e) => {
                drop(file);
                let discard = format!("discard staging file for {name}");
                if let Err(cleanup) = blocking(discard, move || staging_path.close()).await {
                    debug!(blob = name, error = %cleanup, "staging file left behind");
                }
                return Err(e);
            }
        };
        drop(file);

        if !digests_match(expected_hash, &computed) {
            let discard = format!("discard staging file for {name}");
            let result = blocking(discard, move || staging_path.close()).await;
            return Err(reject_mismatch(
                self.observer.as_ref(),
                name,
                expected_hash,
                computed,
                &result,
            ));
        }

        blocking(format!("publish {name}"), move || {
            staging_path.persist(&path).map_err(|e| e.error)
        })
        .await?;
        debug!(blob = name, digest = %computed, "blob published");
        Ok(())
    }

    async fn put_direct(
        &self,
        name: &str,
        path: PathBuf,
        reader: BlobSource<'_>,
        size: u64,
        expected_hash: &str,
    ) -> BlobResult<()> {
        self.ensure_parent(name, &path).await?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| BlobError::backend(format!("create {name}"), e))?;
        let computed = self.copy_hashed(name, reader, size, &mut file).await?;
        drop(file);
        verify_or_discard(self, self.observer.as_ref(), name, expected_hash, computed).await
    }
}

/// Run a blocking filesystem call on tokio's blocking pool.
async fn blocking<T, F>(context: String, f: F) -> BlobResult<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| BlobError::backend(context, e)),
        Err(join) => Err(BlobError::backend(context, join)),
    }
}

impl std::fmt::Debug for FilesystemBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemBackend")
            .field("root", &self.root)
            .field("algorithm", &self.algorithm)
            .field("staged_writes", &self.staged_writes)
            .finish()
    }
}

#[async_trait]
impl Backend for FilesystemBackend {
    async fn get(&self, name: &str) -> BlobResult<StoredBlob> {
        let path = self.path_for(name)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| BlobError::from_io(name, format!("open {name}"), e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| BlobError::backend(format!("stat {name}"), e))?;
        if !meta.is_file() {
            return Err(BlobError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(StoredBlob::new(Box::new(file), meta.len()))
    }

    async fn put(
        &self,
        name: &str,
        reader: BlobSource<'_>,
        size: u64,
        expected_hash: &str,
    ) -> BlobResult<()> {
        let path = self.path_for(name)?;
        if self.staged_writes {
            self.put_staged(name, path, reader, size, expected_hash).await
        } else {
            self.put_direct(name, path, reader, size, expected_hash).await
        }
    }

    async fn remove(&self, name: &str) -> BlobResult<()> {
        let path = self.path_for(name)?;
        let Err(e) = tokio::fs::remove_file(&path).await else {
            return Ok(());
        };
        // A directory of other blobs is not a blob itself.
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Err(BlobError::NotFound {
                name: name.to_string(),
            });
        }
        Err(BlobError::from_io(name, format!("remove {name}"), e))
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}
