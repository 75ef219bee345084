//! Foundation types shared by every stowage crate.
//!
//! Stowage is the storage-integrity layer beneath an artifact registry. This
//! crate holds the small vocabulary the other crates agree on:
//!
//! - [`ErrorKind`] -- the closed set of error categories callers switch on
//! - [`Cleanup`] -- a best-effort cleanup task (orphan index, mismatched blob)
//! - [`CleanupObserver`] -- the side channel cleanup outcomes are reported to

pub mod cleanup;
pub mod error;

pub use cleanup::{
    Cleanup, CleanupObserver, CleanupOutcome, CleanupRecord, RecordingCleanupObserver,
    TracingCleanupObserver,
};
pub use error::ErrorKind;
