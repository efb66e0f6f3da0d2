//! Bundle merging
//!
//! Unions the sections of every resolved source into one canonical
//! document. Sections are keyed by fingerprint; a fingerprint carried by
//! two sources with different content is a conflict and is left out of
//! the merged document. Identical copies are de-duplicated with a warning.
//!
//! Copies are compared by identity hash, which covers metadata (scope,
//! vendor keys, checks) as well as heading and body, so two sources that
//! agree on the text but not on its metadata are in conflict.
//!
//! Within one source only the first section per fingerprint is used; later
//! repeats are dropped with a warning.

use std::collections::{BTreeMap, HashSet};

use ruleweave_canon::{CanonicalizationError, RuleDocument, RuleSection};
use serde::Serialize;

use crate::source::ResolvedSource;

/// Document id used when no source carries a header
pub const DEFAULT_DOCUMENT_ID: &str = "local-rules";

/// Document version used when no source carries a header
pub const DEFAULT_DOCUMENT_VERSION: &str = "0.1.0";

/// Sources disagree about one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub fingerprint: String,
    /// Heading as declared by the first source
    pub heading: String,
    /// Identities of every source that carries the fingerprint
    pub sources: Vec<String>,
    /// Distinct section hashes, in source order
    pub content_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeWarning {
    /// Several sources carry an identical copy of a section
    DuplicateSection {
        fingerprint: String,
        sources: Vec<String>,
    },
    /// One source carries the same fingerprint more than once
    RepeatedInSource {
        fingerprint: String,
        source: String,
    },
}

impl std::fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeWarning::DuplicateSection {
                fingerprint,
                sources,
            } => write!(
                f,
                "section '{}' appears unchanged in {}; keeping one copy",
                fingerprint,
                sources.join(", ")
            ),
            MergeWarning::RepeatedInSource {
                fingerprint,
                source,
            } => write!(
                f,
                "section '{}' repeats within {}; later copies ignored",
                fingerprint, source
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub document: RuleDocument,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<MergeWarning>,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

struct Slot {
    section: RuleSection,
    sources: Vec<String>,
    hashes: Vec<String>,
}

/// Merge resolved sources in declaration order.
pub fn merge_all(sources: &[ResolvedSource]) -> Result<MergeOutcome, CanonicalizationError> {
    let mut document = base_document(sources);
    let mut warnings = Vec::new();

    if let [single] = sources {
        document.sections = first_per_fingerprint(single, &mut warnings)
            .into_iter()
            .cloned()
            .collect();
        return Ok(MergeOutcome {
            document,
            conflicts: Vec::new(),
            warnings,
        });
    }

    let mut order: Vec<String> = Vec::new();
    let mut slots: BTreeMap<String, Slot> = BTreeMap::new();

    for source in sources {
        for section in first_per_fingerprint(source, &mut warnings) {
            let hash = section.identity_hash()?;
            match slots.get_mut(&section.fingerprint) {
                Some(slot) => {
                    if !slot.sources.contains(&source.identity) {
                        slot.sources.push(source.identity.clone());
                    }
                    if !slot.hashes.contains(&hash) {
                        slot.hashes.push(hash);
                    }
                }
                None => {
                    order.push(section.fingerprint.clone());
                    slots.insert(
                        section.fingerprint.clone(),
                        Slot {
                            section: section.clone(),
                            sources: vec![source.identity.clone()],
                            hashes: vec![hash],
                        },
                    );
                }
            }
        }
    }

    let mut conflicts = Vec::new();

    for fingerprint in order {
        let Some(slot) = slots.remove(&fingerprint) else {
            continue;
        };
        if slot.hashes.len() > 1 {
            log::debug!(
                "conflict on '{}' between {}",
                fingerprint,
                slot.sources.join(", ")
            );
            conflicts.push(Conflict {
                fingerprint,
                heading: slot.section.heading.clone(),
                sources: slot.sources,
                content_hashes: slot.hashes,
            });
            continue;
        }
        if slot.sources.len() > 1 {
            let warning = MergeWarning::DuplicateSection {
                fingerprint,
                sources: slot.sources,
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        }
        document.sections.push(slot.section);
    }

    Ok(MergeOutcome {
        document,
        conflicts,
        warnings,
    })
}

fn first_per_fingerprint<'a>(
    source: &'a ResolvedSource,
    warnings: &mut Vec<MergeWarning>,
) -> Vec<&'a RuleSection> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(source.sections.len());
    for section in &source.sections {
        if seen.insert(section.fingerprint.as_str()) {
            kept.push(section);
            continue;
        }
        let warning = MergeWarning::RepeatedInSource {
            fingerprint: section.fingerprint.clone(),
            source: source.identity.clone(),
        };
        if !warnings.contains(&warning) {
            log::warn!("{}", warning);
            warnings.push(warning);
        }
    }
    kept
}

/// Document shell taken from the first source that has a header.
fn base_document(sources: &[ResolvedSource]) -> RuleDocument {
    let mut document = RuleDocument::new(DEFAULT_DOCUMENT_ID, DEFAULT_DOCUMENT_VERSION, Vec::new());

    if let Some(header) = sources.iter().find_map(|s| s.header.as_ref()) {
        document.id = header.id.clone();
        document.version = header.version.clone();
        document.owner = header.owner.clone();
        document.source = header.source.clone();
    }

    if let [single] = sources {
        document.source_sha = single.commit_sha.clone();
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceType;
    use ruleweave_canon::DocumentHeader;
    use std::path::PathBuf;

    fn source(identity: &str, sections: Vec<RuleSection>) -> ResolvedSource {
        ResolvedSource {
            identity: identity.to_string(),
            sections,
            source_path: PathBuf::from(identity),
            source_type: SourceType::Local,
            commit_sha: None,
            header: None,
            documents: Vec::new(),
        }
    }

    fn section(fingerprint: &str, content: &str) -> RuleSection {
        RuleSection::new("Testing", 2, content, fingerprint)
    }

    #[test]
    fn test_single_source_passthrough() {
        let sections = vec![section("testing-001", "a"), section("style", "b")];
        let outcome = merge_all(&[source("rules.md", sections.clone())]).unwrap();

        assert_eq!(outcome.document.sections, sections);
        assert_eq!(outcome.document.id, DEFAULT_DOCUMENT_ID);
        assert!(!outcome.has_conflicts());
    }

    #[test]
    fn test_union_in_declaration_order() {
        let a = source("a.md", vec![section("one", "1"), section("two", "2")]);
        let b = source("b.md", vec![section("three", "3"), section("one", "1")]);
        let outcome = merge_all(&[a, b]).unwrap();

        let fps: Vec<_> = outcome
            .document
            .sections
            .iter()
            .map(|s| s.fingerprint.as_str())
            .collect();
        assert_eq!(fps, vec!["one", "two", "three"]);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_conflict_excluded_and_reported() {
        let a = source("rules/a.md", vec![section("testing-001", "Run unit tests."), section("style", "x")]);
        let b = source("rules/b.md", vec![section("testing-001", "Run integration tests.")]);
        let outcome = merge_all(&[a, b]).unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.fingerprint, "testing-001");
        assert_eq!(conflict.sources, vec!["rules/a.md", "rules/b.md"]);
        assert_eq!(conflict.content_hashes.len(), 2);
        assert!(outcome.document.section("testing-001").is_none());
        assert!(outcome.document.section("style").is_some());
    }

    #[test]
    fn test_three_way_conflict_lists_every_source() {
        let a = source("a", vec![section("x", "1")]);
        let b = source("b", vec![section("x", "1")]);
        let c = source("c", vec![section("x", "2")]);
        let outcome = merge_all(&[a, b, c]).unwrap();

        assert_eq!(outcome.conflicts[0].sources, vec!["a", "b", "c"]);
        assert_eq!(outcome.conflicts[0].content_hashes.len(), 2);
    }

    #[test]
    fn test_header_from_first_document_source() {
        let plain = source("local.md", vec![section("one", "1")]);
        let mut team = source("team.json", vec![section("two", "2")]);
        team.header = Some(DocumentHeader {
            id: "team-rules".to_string(),
            version: "2.1.0".to_string(),
            spec_version: "1".to_string(),
            owner: Some("platform".to_string()),
            source: None,
            integrity: None,
        });
        let outcome = merge_all(&[plain, team]).unwrap();

        assert_eq!(outcome.document.id, "team-rules");
        assert_eq!(outcome.document.version, "2.1.0");
        assert_eq!(outcome.document.owner.as_deref(), Some("platform"));
        assert!(outcome.document.integrity.is_none());
    }

    #[test]
    fn test_metadata_difference_is_a_conflict() {
        let mut stricter = section("testing-001", "Run tests.");
        stricter
            .extra
            .insert("severity".to_string(), serde_json::json!("critical"));
        let a = source("a.md", vec![section("testing-001", "Run tests.")]);
        let b = source("b.md", vec![stricter]);
        let outcome = merge_all(&[a, b]).unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        assert!(outcome.document.sections.is_empty());
    }

    #[test]
    fn test_repeat_within_one_source_warns() {
        let repeated = source(
            "rules.md",
            vec![section("testing-001", "first"), section("testing-001", "second")],
        );
        let outcome = merge_all(&[repeated.clone()]).unwrap();

        assert_eq!(outcome.document.sections.len(), 1);
        assert_eq!(outcome.document.sections[0].content, "first");
        assert_eq!(
            outcome.warnings,
            vec![MergeWarning::RepeatedInSource {
                fingerprint: "testing-001".to_string(),
                source: "rules.md".to_string(),
            }]
        );

        let other = source("other.md", vec![section("style", "x")]);
        let outcome = merge_all(&[repeated, other]).unwrap();
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.document.section("testing-001").unwrap().content, "first");
        assert_eq!(outcome.warnings.len(), 1);
    }
}
