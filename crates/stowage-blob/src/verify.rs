//! The verification step shared by every backend's `put`.

use stowage_crypto::digests_match;
use stowage_types::{Cleanup, CleanupObserver, CleanupOutcome};
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::traits::Backend;

/// Fail with [`BlobError::ShortWrite`] if the stream yielded fewer bytes
/// than announced.
pub fn check_size(name: &str, expected: u64, actual: u64) -> BlobResult<()> {
    if actual != expected {
        return Err(BlobError::ShortWrite {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Compare the digest computed while writing `name` with the expected one.
///
/// On mismatch the object is removed from `backend` (best effort, outcome
/// reported to `observer`) and [`BlobError::HashMismatch`] is returned.
pub async fn verify_or_discard(
    backend: &dyn Backend,
    observer: &dyn CleanupObserver,
    name: &str,
    expected: &str,
    computed: String,
) -> BlobResult<()> {
    if digests_match(expected, &computed) {
        debug!(blob = name, digest = %computed, "blob verified");
        return Ok(());
    }

    let result = match backend.remove(name).await {
        // Someone else already removed it; nothing left to clean up.
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    };
    Err(reject_mismatch(observer, name, expected, computed, &result))
}

/// Report the cleanup of a blob that failed verification and build the
/// [`BlobError::HashMismatch`] the caller returns.
pub fn reject_mismatch<E: std::fmt::Display>(
    observer: &dyn CleanupObserver,
    name: &str,
    expected: &str,
    computed: String,
    cleanup: &Result<(), E>,
) -> BlobError {
    observer.observe(
        &Cleanup::MismatchedBlob {
            name: name.to_string(),
        },
        &CleanupOutcome::from_result(cleanup),
    );
    BlobError::HashMismatch {
        name: name.to_string(),
        expected: expected.trim().to_ascii_lowercase(),
        computed,
    }
}
