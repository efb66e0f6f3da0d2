//! Canonical rule document model
//!
//! A `RuleDocument` is the tool-independent source of truth: an ordered
//! list of `RuleSection`s plus identity, version and optional integrity
//! and provenance fields. Section order matters for rendering only;
//! identity is the section fingerprint.

use std::collections::{BTreeMap, HashSet};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::hash_serializable;
use crate::error::{CanonicalizationError, DocumentError};
use crate::heading::{content_hash, is_valid_fingerprint};

/// Who a section belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Team,
    Personal,
    Shared,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Team => write!(f, "team"),
            Self::Personal => write!(f, "personal"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

/// Per-target metadata: target name -> (key -> value).
///
/// The canonical core stores these bags opaquely; each export format
/// validates only the bag addressed to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorBag(BTreeMap<String, Map<String, Value>>);

impl VendorBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Metadata addressed to one target.
    pub fn get(&self, target: &str) -> Option<&Map<String, Value>> {
        self.0.get(target)
    }

    /// Set one key for one target.
    pub fn insert(&mut self, target: &str, key: &str, value: Value) {
        self.0
            .entry(target.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Target names in sorted order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A machine-checkable assertion attached to a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineCheck {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

/// One titled block of guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSection {
    pub heading: String,

    /// Markdown heading level, 2 through 6
    pub level: u8,

    pub content: String,

    /// Merge identity key
    pub fingerprint: String,

    #[serde(default, skip_serializing_if = "VendorBag::is_empty")]
    pub vendor: VendorBag,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<MachineCheck>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autofix: Option<String>,

    /// Fields outside the canonical model (e.g. added by overlays)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RuleSection {
    pub fn new(
        heading: impl Into<String>,
        level: u8,
        content: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            heading: heading.into(),
            level,
            content: content.into(),
            fingerprint: fingerprint.into(),
            vendor: VendorBag::new(),
            scope: None,
            checks: Vec::new(),
            autofix: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_vendor(mut self, target: &str, key: &str, value: Value) -> Self {
        self.vendor.insert(target, key, value);
        self
    }

    /// Hash of the normalized content only.
    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }

    /// Hash of the whole section (content, heading, metadata).
    pub fn identity_hash(&self) -> Result<String, CanonicalizationError> {
        hash_serializable(self)
    }
}

/// Integrity block of a published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub algo: String,
    pub value: String,
}

/// Identity fields of a document, without its sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub id: String,
    pub version: String,
    pub spec_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

/// The canonical rule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub id: String,

    /// Semantic version of the rule set
    pub version: String,

    pub spec_version: String,

    #[serde(default)]
    pub sections: Vec<RuleSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RuleDocument {
    pub fn new(id: impl Into<String>, version: impl Into<String>, sections: Vec<RuleSection>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            spec_version: crate::SPEC_VERSION.to_string(),
            sections,
            integrity: None,
            owner: None,
            source: None,
            source_sha: None,
            extra: BTreeMap::new(),
        }
    }

    /// Parse from JSON text.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::Parse(e.to_string()))
    }

    /// Parse from a JSON tree.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        serde_json::from_value(value).map_err(|e| DocumentError::Parse(e.to_string()))
    }

    /// Convert to a JSON tree.
    pub fn to_value(&self) -> Result<Value, CanonicalizationError> {
        serde_json::to_value(self).map_err(|e| CanonicalizationError::NotSerializable(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn header(&self) -> DocumentHeader {
        DocumentHeader {
            id: self.id.clone(),
            version: self.version.clone(),
            spec_version: self.spec_version.clone(),
            owner: self.owner.clone(),
            source: self.source.clone(),
            integrity: self.integrity.clone(),
        }
    }

    /// Find a section by fingerprint.
    pub fn section(&self, fingerprint: &str) -> Option<&RuleSection> {
        self.sections.iter().find(|s| s.fingerprint == fingerprint)
    }

    /// Check the structural invariants of the canonical model.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push("id must not be empty".to_string());
        }
        if !is_semver(&self.version) {
            issues.push(format!("version '{}' is not a semantic version", self.version));
        }
        if self.spec_version.trim().is_empty() {
            issues.push("spec_version must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for (i, section) in self.sections.iter().enumerate() {
            if !(2..=6).contains(&section.level) {
                issues.push(format!(
                    "sections[{}] '{}': level {} outside 2-6",
                    i, section.heading, section.level
                ));
            }
            if section.heading.trim().is_empty() {
                issues.push(format!("sections[{}]: heading must not be empty", i));
            }
            if section.fingerprint.trim().is_empty() {
                issues.push(format!("sections[{}]: fingerprint must not be empty", i));
            } else if !is_valid_fingerprint(&section.fingerprint) {
                issues.push(format!(
                    "sections[{}]: fingerprint '{}' must match [a-z0-9][a-z0-9._-]* without '..'",
                    i, section.fingerprint
                ));
            } else if !seen.insert(section.fingerprint.as_str()) {
                issues.push(format!(
                    "sections[{}]: duplicate fingerprint '{}'",
                    i, section.fingerprint
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(DocumentError::Invalid {
                id: self.id.clone(),
                issues,
            })
        }
    }
}

fn is_semver(version: &str) -> bool {
    // major.minor.patch with optional pre-release and build metadata
    let pattern = r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$";
    Regex::new(pattern)
        .map(|re| re.is_match(version))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> RuleDocument {
        RuleDocument::new(
            "base-rules",
            "1.2.0",
            vec![
                RuleSection::new("Testing", 2, "Write tests first.", "testing")
                    .with_scope(Scope::Team),
                RuleSection::new("Code Style", 2, "Use rustfmt.", "code-style")
                    .with_vendor("cursor", "globs", json!(["**/*.rs"])),
            ],
        )
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_document().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_issues() {
        let mut doc = sample_document();
        doc.version = "1.2".to_string();
        doc.sections[0].level = 1;
        doc.sections[1].fingerprint = "testing".to_string();

        let err = doc.validate().unwrap_err();
        let issues = err.issues();
        assert_eq!(issues.len(), 3);
        assert!(issues[0].contains("semantic version"));
        assert!(issues[1].contains("level 1"));
        assert!(issues[2].contains("duplicate fingerprint"));
    }

    #[test]
    fn test_validate_rejects_path_like_fingerprints() {
        for bad in ["../../../escaped", "rules/testing", "Testing", "a..b"] {
            let mut doc = sample_document();
            doc.sections[0].fingerprint = bad.to_string();
            let err = doc.validate().unwrap_err();
            assert_eq!(err.issues().len(), 1, "{}", bad);
            assert!(err.issues()[0].contains(bad));
        }
    }

    #[test]
    fn test_semver() {
        assert!(is_semver("0.1.0"));
        assert!(is_semver("1.0.0-beta.1+build.5"));
        assert!(!is_semver("01.0.0"));
        assert!(!is_semver("v1.0.0"));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let section = RuleSection::new("Testing", 2, "x", "testing");
        let value = serde_json::to_value(&section).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert!(obj.get("vendor").is_none());
        assert!(obj.get("scope").is_none());
    }

    #[test]
    fn test_extra_fields_survive_round_trip() {
        let raw = json!({
            "heading": "Testing",
            "level": 2,
            "content": "x",
            "fingerprint": "testing",
            "severity": "critical"
        });
        let section: RuleSection = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(section.extra.get("severity"), Some(&json!("critical")));
        assert_eq!(serde_json::to_value(&section).unwrap(), raw);
    }

    #[test]
    fn test_vendor_bag_is_map_of_maps() {
        let doc = sample_document();
        let bag = &doc.sections[1].vendor;
        assert_eq!(bag.targets().collect::<Vec<_>>(), vec!["cursor"]);
        assert_eq!(bag.get("cursor").unwrap()["globs"], json!(["**/*.rs"]));

        let bad = json!({
            "heading": "x", "level": 2, "content": "", "fingerprint": "x",
            "vendor": {"cursor": "not-a-map"}
        });
        assert!(serde_json::from_value::<RuleSection>(bad).is_err());
    }

    #[test]
    fn test_document_json_round_trip() {
        let doc = sample_document();
        let json = doc.to_json().unwrap();
        let parsed = RuleDocument::from_json(&json).unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.header().id, "base-rules");
    }

    #[test]
    fn test_identity_hash_covers_metadata() {
        let a = RuleSection::new("Testing", 2, "x", "testing");
        let b = a.clone().with_scope(Scope::Personal);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.identity_hash().unwrap(), b.identity_hash().unwrap());
    }
}
