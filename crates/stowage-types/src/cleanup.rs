//! Best-effort cleanup side channel.
//!
//! Some operations leave garbage behind when they lose a race or fail
//! verification: a candidate index that lost the promotion, a superseded
//! index, a blob whose digest did not match. Removing that garbage is never
//! allowed to change the primary result of the operation. Instead, every
//! cleanup attempt is reported to a [`CleanupObserver`], which is the only
//! place a cleanup failure becomes visible.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A single piece of non-critical cleanup work.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cleanup {
    /// A blob written by `put` whose digest did not match.
    MismatchedBlob { name: String },
    /// A candidate index created by a caller that then lost the promotion
    /// race, or whose promotion failed.
    OrphanIndex { index: String },
    /// The previously live index after a successful promotion.
    SupersededIndex { index: String },
}

impl Cleanup {
    /// The object or index name this cleanup targets.
    pub fn target(&self) -> &str {
        match self {
            Cleanup::MismatchedBlob { name } => name,
            Cleanup::OrphanIndex { index } => index,
            Cleanup::SupersededIndex { index } => index,
        }
    }
}

impl fmt::Display for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cleanup::MismatchedBlob { name } => write!(f, "mismatched blob {name}"),
            Cleanup::OrphanIndex { index } => write!(f, "orphan index {index}"),
            Cleanup::SupersededIndex { index } => write!(f, "superseded index {index}"),
        }
    }
}

/// Result of a cleanup attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupOutcome {
    Completed,
    Failed { reason: String },
}

impl CleanupOutcome {
    /// Build an outcome from the result of the cleanup call.
    pub fn from_result<E: fmt::Display>(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => CleanupOutcome::Completed,
            Err(e) => CleanupOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CleanupOutcome::Failed { .. })
    }
}

/// Receives the outcome of every best-effort cleanup.
///
/// Implementations must not panic and must not block for long: they run
/// inline on the path of the operation that triggered the cleanup.
pub trait CleanupObserver: Send + Sync {
    fn observe(&self, cleanup: &Cleanup, outcome: &CleanupOutcome);
}

/// Default observer: successful cleanups are logged at debug level,
/// failures as warnings.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingCleanupObserver;

impl CleanupObserver for TracingCleanupObserver {
    fn observe(&self, cleanup: &Cleanup, outcome: &CleanupOutcome) {
        match outcome {
            CleanupOutcome::Completed => {
                tracing::debug!(object = cleanup.target(), "cleaned up {cleanup}");
            }
            CleanupOutcome::Failed { reason } => {
                tracing::warn!(
                    object = cleanup.target(),
                    error = %reason,
                    "could not clean up {cleanup}; leaving it in place"
                );
            }
        }
    }
}

/// One entry in a [`RecordingCleanupObserver`] ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRecord {
    pub cleanup: Cleanup,
    pub outcome: CleanupOutcome,
}

/// Observer that keeps every outcome in memory, in arrival order.
///
/// Also forwards to [`TracingCleanupObserver`] so nothing is lost from the
/// logs when it is installed.
#[derive(Debug, Default)]
pub struct RecordingCleanupObserver {
    records: Mutex<Vec<CleanupRecord>>,
}

impl RecordingCleanupObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything observed so far.
    pub fn records(&self) -> Vec<CleanupRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of cleanups that failed.
    pub fn failures(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| r.outcome.is_failed())
            .count()
    }
}

impl CleanupObserver for RecordingCleanupObserver {
    fn observe(&self, cleanup: &Cleanup, outcome: &CleanupOutcome) {
        TracingCleanupObserver.observe(cleanup, outcome);
        if let Ok(mut records) = self.records.lock() {
            records.push(CleanupRecord {
                cleanup: cleanup.clone(),
                outcome: outcome.clone(),
            });
        }
    }
}
