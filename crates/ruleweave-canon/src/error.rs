//! Error types for canonicalization and document validation.

use thiserror::Error;

/// Failure to produce canonical bytes for a value.
///
/// Raised for input that has no JSON representation (non-string map keys)
/// and for malformed `_meta.volatile` declarations.
/// Never retried: the same input always fails the same way.
#[derive(Debug, Error)]
pub enum CanonicalizationError {
    #[error("value is not representable as JSON: {0}")]
    NotSerializable(String),

    #[error("invalid _meta.volatile at {path}: {reason}")]
    InvalidVolatile { path: String, reason: String },

    #[error("JCS canonicalization error: {0}")]
    Jcs(String),
}

/// A rule document that violates the canonical model.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid rule document {id}: {}", issues.join("; "))]
    Invalid { id: String, issues: Vec<String> },

    #[error("cannot parse rule document: {0}")]
    Parse(String),
}

impl DocumentError {
    /// Issues found during validation (empty for parse errors).
    pub fn issues(&self) -> &[String] {
        match self {
            Self::Invalid { issues, .. } => issues,
            Self::Parse(_) => &[],
        }
    }
}
