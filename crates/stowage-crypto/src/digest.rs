use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

/// Hash function used to bind blob content to its expected digest.
///
/// Registry clients send SHA-384 digests, so that is the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha384,
    Sha256,
    Blake3,
}

impl DigestAlgorithm {
    /// Start a fresh accumulator for this algorithm.
    pub fn start(self) -> StreamingDigest {
        StreamingDigest::new(self)
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha384 => 96,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Blake3 => 64,
        }
    }

    /// Hash a complete in-memory buffer.
    pub fn hash_hex(self, data: &[u8]) -> String {
        let mut digest = self.start();
        digest.update(data);
        digest.finalize_hex()
    }

    /// Check that `expected` is a well-formed hex digest for this algorithm
    /// and return it in canonical (trimmed, lowercase) form.
    pub fn parse_hex(self, expected: &str) -> Result<String, DigestError> {
        let canonical = expected.trim().to_ascii_lowercase();
        if canonical.len() != self.hex_len() {
            return Err(DigestError::InvalidLength {
                algorithm: self,
                expected: self.hex_len(),
                actual: canonical.len(),
            });
        }
        if !canonical.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidHex(expected.to_string()));
        }
        Ok(canonical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha384" | "sha-384" => Ok(DigestAlgorithm::Sha384),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "blake3" => Ok(DigestAlgorithm::Blake3),
            other => Err(DigestError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Incremental digest over a byte stream.
///
/// Memory use is constant regardless of how many bytes are fed in.
pub enum StreamingDigest {
    Sha384(sha2::Sha384),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingDigest {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha384 => StreamingDigest::Sha384(sha2::Sha384::new()),
            DigestAlgorithm::Sha256 => StreamingDigest::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Blake3 => StreamingDigest::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            StreamingDigest::Sha384(_) => DigestAlgorithm::Sha384,
            StreamingDigest::Sha256(_) => DigestAlgorithm::Sha256,
            StreamingDigest::Blake3(_) => DigestAlgorithm::Blake3,
        }
    }

    /// Feed the next chunk of the stream.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingDigest::Sha384(h) => h.update(data),
            StreamingDigest::Sha256(h) => h.update(data),
            StreamingDigest::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consume the accumulator and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            StreamingDigest::Sha384(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha256(h) => hex::encode(h.finalize()),
            StreamingDigest::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

impl fmt::Debug for StreamingDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingDigest")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

/// Compare a computed hex digest against a caller-supplied one.
///
/// Surrounding whitespace and letter case in `expected` are ignored.
pub fn digests_match(expected: &str, computed: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(computed)
}

/// Errors from digest parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid hex digest: {0}")]
    InvalidHex(String),

    #[error("invalid {algorithm} digest length: expected {expected} hex chars, got {actual}")]
    InvalidLength {
        algorithm: DigestAlgorithm,
        expected: usize,
        actual: usize,
    },
}
