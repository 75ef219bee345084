//! Blob storage for stowage.
//!
//! A [`Backend`] stores named binary artifacts in a container and binds each
//! one to a caller-supplied hex digest at write time. `put` hashes the bytes
//! as they stream through to the backend and only reports success when the
//! computed digest matches; a mismatched object is removed again on a
//! best-effort basis and the caller gets [`BlobError::HashMismatch`].
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- `HashMap`-based container for tests and embedding
//! - [`FilesystemBackend`] -- a directory on local disk, with staged writes
//! - [`ObjectStoreBackend`] -- anything `object_store` speaks (S3, GCS,
//!   Azure, local, memory)
//!
//! # Design Rules
//!
//! 1. Every backend-specific "not found" becomes [`BlobError::NotFound`].
//! 2. Verification is a streaming accumulator; payloads are never buffered
//!    whole by the verifying path.
//! 3. Cleanup after a mismatch never changes the error the caller sees; its
//!    outcome goes to the configured [`CleanupObserver`](stowage_types::CleanupObserver).
//! 4. Write failures are propagated unchanged.

pub mod backends;
pub mod config;
pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod verify;

pub use backends::{FilesystemBackend, ObjectStoreBackend};
pub use config::{open_backend, BackendConfig, BlobConfig};
pub use error::{BlobError, BlobResult};
pub use memory::InMemoryBackend;
pub use names::validate_blob_name;
pub use traits::{Backend, BlobRead, BlobSource, StoredBlob};
