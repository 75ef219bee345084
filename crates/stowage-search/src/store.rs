//! The [`SearchStore`] trait: primitives the external search store must
//! provide for lifecycle management.
//!
//! Any client (an Elasticsearch HTTP client, an in-memory fake) implements
//! this trait. The lifecycle protocol is only sound if
//! [`put_document_if`](SearchStore::put_document_if) is a true
//! revision-checked conditional write.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SearchResult;

/// A stored document together with its revision.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedDocument {
    pub body: Value,
    /// Incremented by exactly one on every successful write. The first
    /// write of a document gives revision 1.
    pub revision: u64,
}

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write happened; the document now has `revision`.
    Applied { revision: u64 },
    /// The document's revision was not the expected one. Nothing changed.
    Conflict { current: u64 },
}

impl CasOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, CasOutcome::Applied { .. })
    }
}

/// Storage backend for search indexes and their metadata.
///
/// Implementations must be thread-safe (`Send + Sync`) and each method must
/// be atomic with respect to every other caller of the same store, including
/// callers in other processes.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Read document `id` from `index`.
    ///
    /// Returns `Ok(None)` if the document (or the index) does not exist.
    async fn get_document(&self, index: &str, id: &str) -> SearchResult<Option<VersionedDocument>>;

    /// Write `body` as document `id` in `index`, only if the document's
    /// current revision equals `expected_revision`.
    ///
    /// An absent document has revision 0, so `expected_revision == 0`
    /// means "create only if missing". A revision mismatch is reported as
    /// [`CasOutcome::Conflict`], not as an error.
    async fn put_document_if(
        &self,
        index: &str,
        id: &str,
        body: &Value,
        expected_revision: u64,
    ) -> SearchResult<CasOutcome>;

    /// Names of the physical indexes `alias` currently resolves to.
    ///
    /// Returns an empty list if the alias does not exist.
    async fn list_indexes_for_alias(&self, alias: &str) -> SearchResult<Vec<String>>;

    /// Whether the physical index `index` exists.
    async fn index_exists(&self, index: &str) -> SearchResult<bool>;

    /// Create an empty physical index and apply `schema` (settings and
    /// mappings). Fails if the index already exists.
    async fn create_index(&self, index: &str, schema: &Value) -> SearchResult<()>;

    /// Atomically make `alias` resolve to `index` and nothing else, but only
    /// if it currently resolves to exactly the indexes in `expected` (in any
    /// order; empty means the alias does not exist yet).
    ///
    /// Returns `Ok(false)` and changes nothing if the alias has moved since
    /// `expected` was read. Fails with `NotFound` if `index` does not exist.
    async fn retarget_alias(
        &self,
        alias: &str,
        expected: &[String],
        index: &str,
    ) -> SearchResult<bool>;

    /// Delete a physical index, along with any alias entries pointing at it.
    ///
    /// Fails with `NotFound` if the index does not exist.
    async fn delete_index(&self, index: &str) -> SearchResult<()>;
}
