use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a stowage error.
///
/// The set is closed: every error returned by a stowage crate maps onto
/// exactly one of these, so callers can `match` exhaustively instead of
/// inspecting messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The named object, document, index, or alias does not exist.
    NotFound,
    /// Content written by `put` did not match the caller-supplied digest.
    HashMismatch,
    /// A compare-and-swap retry loop gave up after its attempt ceiling.
    Contention,
    /// Any other backend or store failure. Opaque to callers.
    Other,
}

impl ErrorKind {
    /// Short lowercase label, suitable for log fields and metrics tags.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::HashMismatch => "hash_mismatch",
            ErrorKind::Contention => "contention",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
