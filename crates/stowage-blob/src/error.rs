use stowage_types::ErrorKind;

/// Boxed source error from a backend client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from blob backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The named blob does not exist in the container.
    #[error("blob not found: {name}")]
    NotFound { name: String },

    /// The bytes written did not hash to the caller-supplied digest.
    #[error("hash mismatch for {name}: expected {expected}, computed {computed}")]
    HashMismatch {
        name: String,
        expected: String,
        computed: String,
    },

    /// The upload stream ended before `size` bytes were read.
    #[error("short write for {name}: expected {expected} bytes, stream ended after {actual}")]
    ShortWrite {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// The blob name cannot be stored by this backend.
    #[error("invalid blob name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The backend could not be constructed from its configuration.
    #[error("invalid blob backend configuration: {0}")]
    Config(String),

    /// Any other backend failure, with the operation that hit it.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl BlobError {
    /// Wrap an opaque backend failure with context.
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BlobError::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Map an I/O error, turning `NotFound` into [`BlobError::NotFound`].
    pub fn from_io(name: &str, context: impl Into<String>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BlobError::NotFound {
                name: name.to_string(),
            }
        } else {
            BlobError::backend(context, err)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BlobError::NotFound { .. } => ErrorKind::NotFound,
            BlobError::HashMismatch { .. } => ErrorKind::HashMismatch,
            BlobError::ShortWrite { .. }
            | BlobError::InvalidName { .. }
            | BlobError::Config(_)
            | BlobError::Backend { .. } => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;
