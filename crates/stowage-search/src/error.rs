//! Error types for index lifecycle operations.

use stowage_types::ErrorKind;
use thiserror::Error;

/// Boxed source error from a search store client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while managing search indexes.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The index, alias, or document was not found.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An index with this name already exists.
    #[error("index already exists: {name}")]
    AlreadyExists { name: String },

    /// The promotion loop ran out of attempts while other callers kept
    /// winning the compare-and-swap.
    #[error("gave up promoting a new index for alias {alias} after {attempts} attempts")]
    Contention { alias: String, attempts: u32 },

    /// The alias or index name is not acceptable to the store.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The version document exists but cannot be decoded.
    #[error("malformed version document for alias {alias}: {source}")]
    MalformedDocument {
        alias: String,
        #[source]
        source: serde_json::Error,
    },

    /// Any other store failure, with the operation that hit it.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl SearchError {
    /// Wrap an opaque store failure with context.
    pub fn store(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SearchError::Store {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SearchError::NotFound { what: what.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::NotFound { .. } => ErrorKind::NotFound,
            SearchError::Contention { .. } => ErrorKind::Contention,
            SearchError::AlreadyExists { .. }
            | SearchError::InvalidName { .. }
            | SearchError::MalformedDocument { .. }
            | SearchError::Store { .. } => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Convenience type alias for index operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;
