//! Alias and physical index naming.
//!
//! Valid alias and index names (the rules search stores enforce):
//! - Must be non-empty and at most 255 bytes
//! - Must be lowercase
//! - Must not contain whitespace, `\`, `/`, `*`, `?`, `"`, `<`, `>`, `|`,
//!   `,`, `#` or `:`
//! - Must not start with `-`, `_`, `+` or `.`

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::error::{SearchError, SearchResult};

/// Characters that are forbidden anywhere in a name.
const FORBIDDEN_CHARS: &[char] = &[
    ' ', '\t', '\n', '\r', '\\', '/', '*', '?', '"', '<', '>', '|', ',', '#', ':',
];

const MAX_NAME_LEN: usize = 255;

/// Validate a physical index name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use stowage_search::names::validate_index_name;
///
/// assert!(validate_index_name("charms-000001").is_ok());
/// assert!(validate_index_name("Charms").is_err());
/// assert!(validate_index_name("_charms").is_err());
/// ```
pub fn validate_index_name(name: &str) -> SearchResult<()> {
    let invalid = |reason: String| SearchError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(format!("longer than {MAX_NAME_LEN} bytes")));
    }
    if name.chars().any(|c| c.is_uppercase()) {
        return Err(invalid("must be lowercase".into()));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(format!("contains forbidden character: {ch:?}")));
        }
    }
    if name.starts_with(['-', '_', '+', '.']) {
        return Err(invalid("must not start with '-', '_', '+' or '.'".into()));
    }
    Ok(())
}

/// Validate an alias name. Same rules as index names.
pub fn validate_alias_name(name: &str) -> SearchResult<()> {
    validate_index_name(name)
}

/// Source of fresh physical index names for an alias.
///
/// Names must never repeat: an index name that was created and deleted must
/// not be handed out again.
pub trait IndexNameGenerator: Send + Sync {
    fn next_name(&self, alias: &str) -> String;
}

/// `{alias}-{uuid v7}`. Unique across processes and machines.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniqueIndexNames;

impl IndexNameGenerator for UniqueIndexNames {
    fn next_name(&self, alias: &str) -> String {
        format!("{alias}-{}", Uuid::now_v7().simple())
    }
}

/// `{alias}-000001`, `{alias}-000002`, ...
///
/// The counter lives in this process only. Share one instance between
/// every caller in the process; use [`UniqueIndexNames`] when several
/// processes manage the same alias.
#[derive(Debug)]
pub struct SequentialIndexNames {
    next: AtomicU64,
}

impl SequentialIndexNames {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIndexNames {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexNameGenerator for SequentialIndexNames {
    fn next_name(&self, alias: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{alias}-{n:06}")
    }
}
