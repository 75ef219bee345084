//! Blob name validation for path-backed containers.
//!
//! Blob names are opaque strings, but backends that map them onto a
//! directory tree must not let a name escape the container. Valid names:
//! - Must be non-empty
//! - Must not contain NUL or `\`
//! - Must not start or end with `/`
//! - Components between slashes must be non-empty and must not start with
//!   `.` (which also rules out `.` and `..`)

use crate::error::{BlobError, BlobResult};

/// Validate a blob name, returning `Ok(())` if it is safe to map onto a
/// path under the container root.
///
/// # Examples
///
/// ```
/// use stowage_blob::names::validate_blob_name;
///
/// assert!(validate_blob_name("archive/abc123").is_ok());
/// assert!(validate_blob_name("").is_err());
/// assert!(validate_blob_name("../etc/passwd").is_err());
/// ```
pub fn validate_blob_name(name: &str) -> BlobResult<()> {
    let invalid = |reason: &str| BlobError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("blob name must not be empty"));
    }
    if name.contains('\0') || name.contains('\\') {
        return Err(invalid("contains a forbidden character"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid("path components must not start with '.'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        for name in ["abc", "charm-1.zip", "archive/sha384/abcdef", "a b"] {
            assert!(validate_blob_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_escapes() {
        for name in [
            "",
            "/abs",
            "trailing/",
            "a//b",
            "..",
            "a/../b",
            ".hidden",
            "a/.tmpXYZ",
            "win\\path",
            "nul\0byte",
        ] {
            let err = validate_blob_name(name).unwrap_err();
            assert!(matches!(err, BlobError::InvalidName { .. }), "{name:?}");
        }
    }
}
