use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stowage_crypto::DigestAlgorithm;
use stowage_types::CleanupObserver;
use tracing::info;

use crate::backends::{FilesystemBackend, ObjectStoreBackend};
use crate::error::BlobResult;
use crate::memory::InMemoryBackend;
use crate::traits::Backend;

/// Which container implementation to use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Process-local container, lost on exit.
    Memory,
    /// A directory on local disk.
    Filesystem {
        root: PathBuf,
        /// Write to a staging file and publish only after verification.
        #[serde(default = "default_staged_writes")]
        staged_writes: bool,
    },
    /// Any `object_store` URL (`s3://bucket/prefix`, `gs://...`, `file://...`).
    ObjectStore {
        url: String,
        /// Builder options such as `aws_region` or `aws_endpoint`.
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
}

fn default_staged_writes() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Filesystem {
            root: PathBuf::from("stowage_storage/blobs"),
            staged_writes: true,
        }
    }
}

/// Configuration for the blob layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Algorithm expected digests are computed with.
    #[serde(default)]
    pub digest: DigestAlgorithm,
}

/// Build the backend described by `config`.
pub fn open_backend(
    config: &BlobConfig,
    observer: Arc<dyn CleanupObserver>,
) -> BlobResult<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match &config.backend {
        BackendConfig::Memory => Arc::new(
            InMemoryBackend::with_algorithm(config.digest).with_observer(observer),
        ),
        BackendConfig::Filesystem {
            root,
            staged_writes,
        } => Arc::new(
            FilesystemBackend::open(root.clone())?
                .with_algorithm(config.digest)
                .with_staged_writes(*staged_writes)
                .with_observer(observer),
        ),
        BackendConfig::ObjectStore { url, options } => Arc::new(
            ObjectStoreBackend::from_url(url, options.iter())?
                .with_algorithm(config.digest)
                .with_observer(observer),
        ),
    };
    info!(backend = ?config.backend, digest = %config.digest, "blob backend ready");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_types::TracingCleanupObserver;

    #[test]
    fn default_config() {
        let c = BlobConfig::default();
        assert_eq!(c.digest, DigestAlgorithm::Sha384);
        assert!(matches!(
            c.backend,
            BackendConfig::Filesystem {
                staged_writes: true,
                ..
            }
        ));
    }

    #[test]
    fn parse_filesystem_from_toml() {
        let c: BlobConfig = toml::from_str(
            r#"
            digest = "sha256"

            [backend]
            kind = "filesystem"
            root = "/var/lib/stowage"
            "#,
        )
        .unwrap();
        assert_eq!(c.digest, DigestAlgorithm::Sha256);
        assert_eq!(
            c.backend,
            BackendConfig::Filesystem {
                root: PathBuf::from("/var/lib/stowage"),
                staged_writes: true,
            }
        );
    }

    #[test]
    fn parse_object_store_from_toml() {
        let c: BlobConfig = toml::from_str(
            r#"
            [backend]
            kind = "object_store"
            url = "s3://charmstore/blobs"

            [backend.options]
            aws_region = "eu-west-1"
            "#,
        )
        .unwrap();
        match c.backend {
            BackendConfig::ObjectStore { url, options } => {
                assert_eq!(url, "s3://charmstore/blobs");
                assert_eq!(options.get("aws_region").map(String::as_str), Some("eu-west-1"));
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_memory_backend() {
        let config = BlobConfig {
            backend: BackendConfig::Memory,
            digest: DigestAlgorithm::Blake3,
        };
        let backend = open_backend(&config, Arc::new(TracingCleanupObserver)).unwrap();
        assert_eq!(backend.digest_algorithm(), DigestAlgorithm::Blake3);
        assert!(backend.get("nothing").await.unwrap_err().is_not_found());
    }

    #[test]
    fn open_filesystem_backend_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/blobs");
        let config = BlobConfig {
            backend: BackendConfig::Filesystem {
                root: root.clone(),
                staged_writes: false,
            },
            digest: DigestAlgorithm::Sha384,
        };
        open_backend(&config, Arc::new(TracingCleanupObserver)).unwrap();
        assert!(root.is_dir());
    }
}
