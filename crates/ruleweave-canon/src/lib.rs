//! Canonical rule documents
//!
//! The tool-independent model every other part of ruleweave agrees on:
//! sections, documents, fingerprints, and the JCS + SHA-256 identity
//! used for integrity checks and deterministic export hashes.

pub mod canonical;
pub mod document;
pub mod error;
pub mod heading;
pub mod integrity;

pub use canonical::{
    canonicalize, canonicalize_serializable, hash_bytes, hash_serializable, hash_value,
    strip_volatile, META_KEY, VOLATILE_KEY,
};
pub use document::{
    DocumentHeader, Integrity, MachineCheck, RuleDocument, RuleSection, Scope, VendorBag,
};
pub use error::{CanonicalizationError, DocumentError};
pub use heading::{
    content_hash, fingerprint_from_heading, is_valid_fingerprint, normalize_content,
    normalize_heading,
};
pub use integrity::{
    compute_document_hash, is_valid_digest, seal_document, verify_integrity, IntegrityStatus,
    INTEGRITY_ALGO, INTEGRITY_PLACEHOLDER,
};

/// Version of the canonical document format written by this crate.
pub const SPEC_VERSION: &str = "1";
