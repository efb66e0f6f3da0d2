//! Document integrity
//!
//! `integrity.value` = SHA-256 hex of JCS(document) where, before hashing,
//! `integrity.value` itself is replaced by the placeholder and volatile
//! paths are stripped. A document may carry the placeholder literally
//! until it is published; verification recomputes and compares.

use serde::Serialize;
use serde_json::{json, Value};

use crate::canonical::hash_value;
use crate::error::CanonicalizationError;

/// The only supported integrity algorithm.
pub const INTEGRITY_ALGO: &str = "jcs-sha256";

/// Placeholder accepted before publish; also the hashing sentinel.
pub const INTEGRITY_PLACEHOLDER: &str = "<computed>";

/// Outcome of verifying a document's integrity block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// Stored digest matches the recomputed digest
    Verified { digest: String },
    /// Document carries the pre-publish placeholder
    Placeholder { computed: String },
    /// Document has no integrity block
    Missing { computed: String },
    /// Stored digest differs from the recomputed digest
    Mismatch { stored: String, computed: String },
    /// Stored value is neither a digest nor the placeholder
    Malformed { value: String, computed: String },
    UnsupportedAlgo { algo: String },
}

impl IntegrityStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Whether the status is a hard failure (stored data contradicts content).
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Mismatch { .. } | Self::Malformed { .. } | Self::UnsupportedAlgo { .. }
        )
    }

    /// Recomputed digest, when one was computed.
    pub fn computed(&self) -> Option<&str> {
        match self {
            Self::Verified { digest } => Some(digest),
            Self::Placeholder { computed }
            | Self::Missing { computed }
            | Self::Mismatch { computed, .. }
            | Self::Malformed { computed, .. } => Some(computed),
            Self::UnsupportedAlgo { .. } => None,
        }
    }
}

/// True for a 64-character lowercase hex digest.
pub fn is_valid_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Hash a document tree with its integrity value neutralized.
pub fn compute_document_hash(document: &Value) -> Result<String, CanonicalizationError> {
    let mut copy = document.clone();
    if let Some(integrity) = copy.get_mut("integrity").and_then(Value::as_object_mut) {
        integrity.insert("value".to_string(), json!(INTEGRITY_PLACEHOLDER));
    }
    hash_value(&copy)
}

/// Recompute and compare a document's integrity value.
pub fn verify_integrity(document: &Value) -> Result<IntegrityStatus, CanonicalizationError> {
    let Some(integrity) = document.get("integrity").and_then(Value::as_object) else {
        let computed = compute_document_hash(document)?;
        return Ok(IntegrityStatus::Missing { computed });
    };

    let algo = integrity.get("algo").and_then(Value::as_str).unwrap_or("");
    if algo != INTEGRITY_ALGO {
        return Ok(IntegrityStatus::UnsupportedAlgo {
            algo: algo.to_string(),
        });
    }

    let stored = integrity.get("value").and_then(Value::as_str).unwrap_or("");
    let computed = compute_document_hash(document)?;

    if stored == INTEGRITY_PLACEHOLDER {
        return Ok(IntegrityStatus::Placeholder { computed });
    }
    if !is_valid_digest(stored) {
        return Ok(IntegrityStatus::Malformed {
            value: stored.to_string(),
            computed,
        });
    }
    if stored == computed {
        Ok(IntegrityStatus::Verified { digest: computed })
    } else {
        Ok(IntegrityStatus::Mismatch {
            stored: stored.to_string(),
            computed,
        })
    }
}

/// Return a copy of the document with a fresh integrity block.
pub fn seal_document(document: &Value) -> Result<Value, CanonicalizationError> {
    let mut sealed = document.clone();
    let Some(map) = sealed.as_object_mut() else {
        return Err(CanonicalizationError::NotSerializable(
            "rule document must be a JSON object".to_string(),
        ));
    };
    map.insert(
        "integrity".to_string(),
        json!({"algo": INTEGRITY_ALGO, "value": INTEGRITY_PLACEHOLDER}),
    );

    let digest = compute_document_hash(&sealed)?;
    if let Some(integrity) = sealed.get_mut("integrity").and_then(Value::as_object_mut) {
        integrity.insert("value".to_string(), Value::String(digest));
    }
    Ok(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Value {
        json!({
            "id": "base",
            "version": "1.0.0",
            "spec_version": "1",
            "sections": [
                {"heading": "Testing", "level": 2, "content": "Write tests.", "fingerprint": "testing"}
            ]
        })
    }

    #[test]
    fn test_seal_then_verify() {
        let sealed = seal_document(&document()).unwrap();
        let value = sealed["integrity"]["value"].as_str().unwrap();
        assert!(is_valid_digest(value));
        assert!(verify_integrity(&sealed).unwrap().is_verified());
    }

    #[test]
    fn test_hash_excludes_integrity_value() {
        let sealed = seal_document(&document()).unwrap();
        let mut tampered_value = sealed.clone();
        tampered_value["integrity"]["value"] = json!("0".repeat(64));
        assert_eq!(
            compute_document_hash(&sealed).unwrap(),
            compute_document_hash(&tampered_value).unwrap()
        );
    }

    #[test]
    fn test_content_change_is_mismatch() {
        let mut sealed = seal_document(&document()).unwrap();
        sealed["sections"][0]["content"] = json!("Skip tests.");
        match verify_integrity(&sealed).unwrap() {
            IntegrityStatus::Mismatch { stored, computed } => assert_ne!(stored, computed),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_and_missing() {
        let mut doc = document();
        assert!(matches!(
            verify_integrity(&doc).unwrap(),
            IntegrityStatus::Missing { .. }
        ));

        doc["integrity"] = json!({"algo": INTEGRITY_ALGO, "value": INTEGRITY_PLACEHOLDER});
        let status = verify_integrity(&doc).unwrap();
        assert!(matches!(status, IntegrityStatus::Placeholder { .. }));
        assert!(!status.is_failure());
    }

    #[test]
    fn test_malformed_and_unsupported() {
        let mut doc = document();
        doc["integrity"] = json!({"algo": INTEGRITY_ALGO, "value": "ABC"});
        assert!(verify_integrity(&doc).unwrap().is_failure());

        doc["integrity"] = json!({"algo": "md5", "value": "x"});
        assert!(matches!(
            verify_integrity(&doc).unwrap(),
            IntegrityStatus::UnsupportedAlgo { .. }
        ));
    }

    #[test]
    fn test_uppercase_digest_rejected() {
        assert!(!is_valid_digest(&"A".repeat(64)));
        assert!(is_valid_digest(&"a".repeat(64)));
        assert!(!is_valid_digest(&"a".repeat(63)));
    }
}
