//! Content digests for stowage.
//!
//! Blobs are bound to a caller-supplied hex digest at write time. Verifying
//! that binding must not require buffering the payload, so everything here
//! is a streaming accumulator: feed bytes as they pass through, read the hex
//! digest at the end.
//!
//! All hashing wraps established libraries (`sha2`, `blake3`).

pub mod digest;
pub mod reader;

pub use digest::{digests_match, DigestAlgorithm, DigestError, StreamingDigest};
pub use reader::HashingReader;
