//! Mode policy for resolved sources
//!
//! Solo mode reports integrity problems and carries on. Team and
//! enterprise modes fail on them unless the bypass is enabled, and
//! enterprise additionally requires provenance on every rule document.

use ruleweave_canon::IntegrityStatus;

use crate::config::Mode;
use crate::error::SyncError;
use crate::source::{LoadedDocument, ResolvedSource};

/// Check every loaded document against `mode`.
///
/// Returns the warnings raised along the way; the first fatal problem
/// becomes the error.
pub fn enforce(
    mode: Mode,
    allow_integrity_bypass: bool,
    sources: &[ResolvedSource],
) -> Result<Vec<String>, SyncError> {
    let mut warnings = Vec::new();

    for document in sources.iter().flat_map(|s| s.documents.iter()) {
        if mode.requires_provenance() {
            check_provenance(mode, document)?;
        }
        if let Some(warning) = check_integrity(mode, allow_integrity_bypass, document)? {
            log::warn!("{}", warning);
            warnings.push(warning);
        }
    }

    Ok(warnings)
}

fn check_integrity(
    mode: Mode,
    bypass: bool,
    document: &LoadedDocument,
) -> Result<Option<String>, SyncError> {
    let subject = document.path.display().to_string();
    let (stored, computed) = match &document.integrity {
        IntegrityStatus::Verified { .. } | IntegrityStatus::Missing { .. } => return Ok(None),
        IntegrityStatus::Placeholder { .. } => {
            if mode == Mode::Solo {
                return Ok(None);
            }
            return Ok(Some(format!(
                "{} carries the integrity placeholder; seal it before publishing",
                subject
            )));
        }
        IntegrityStatus::Mismatch { stored, computed } => (stored.clone(), computed.clone()),
        IntegrityStatus::Malformed { value, computed } => (value.clone(), computed.clone()),
        IntegrityStatus::UnsupportedAlgo { algo } => {
            (format!("algo {}", algo), "unsupported".to_string())
        }
    };

    if !mode.integrity_is_fatal() {
        return Ok(Some(format!(
            "integrity mismatch for {} (stored {}, computed {})",
            subject, stored, computed
        )));
    }
    if bypass {
        return Ok(Some(format!(
            "integrity check bypassed for {} in {} mode (stored {}, computed {})",
            subject, mode, stored, computed
        )));
    }
    Err(SyncError::IntegrityMismatch {
        subject,
        stored,
        computed,
    })
}

fn check_provenance(mode: Mode, document: &LoadedDocument) -> Result<(), SyncError> {
    let header = &document.header;
    let mut missing = Vec::new();
    if header.owner.as_deref().map_or(true, str::is_empty) {
        missing.push("owner".to_string());
    }
    if header.source.as_deref().map_or(true, str::is_empty) {
        missing.push("source".to_string());
    }
    if header.integrity.is_none() {
        missing.push("integrity".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::MissingProvenance {
            subject: document.path.display().to_string(),
            mode: mode.to_string(),
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceType;
    use ruleweave_canon::{DocumentHeader, Integrity};
    use std::path::PathBuf;

    fn header(with_provenance: bool) -> DocumentHeader {
        DocumentHeader {
            id: "rules".to_string(),
            version: "1.0.0".to_string(),
            spec_version: "1".to_string(),
            owner: with_provenance.then(|| "platform-team".to_string()),
            source: with_provenance.then(|| "https://example.com/rules.git".to_string()),
            integrity: with_provenance.then(|| Integrity {
                algo: "jcs-sha256".to_string(),
                value: "a".repeat(64),
            }),
        }
    }

    fn source(integrity: IntegrityStatus, with_provenance: bool) -> ResolvedSource {
        ResolvedSource {
            identity: "rules".to_string(),
            sections: Vec::new(),
            source_path: PathBuf::from("rules"),
            source_type: SourceType::Local,
            commit_sha: None,
            header: Some(header(with_provenance)),
            documents: vec![LoadedDocument {
                path: PathBuf::from("rules/team.json"),
                header: header(with_provenance),
                integrity,
            }],
        }
    }

    fn mismatch() -> IntegrityStatus {
        IntegrityStatus::Mismatch {
            stored: "a".repeat(64),
            computed: "b".repeat(64),
        }
    }

    #[test]
    fn test_solo_warns_on_mismatch() {
        let warnings = enforce(Mode::Solo, false, &[source(mismatch(), false)]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("rules/team.json"));
    }

    #[test]
    fn test_team_mismatch_is_fatal() {
        let err = enforce(Mode::Team, false, &[source(mismatch(), false)]).unwrap_err();
        assert!(matches!(err, SyncError::IntegrityMismatch { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_team_bypass_warns() {
        let warnings = enforce(Mode::Team, true, &[source(mismatch(), false)]).unwrap();
        assert!(warnings[0].contains("bypassed"));
    }

    #[test]
    fn test_enterprise_requires_provenance() {
        let verified = IntegrityStatus::Verified {
            digest: "a".repeat(64),
        };
        let err = enforce(Mode::Enterprise, false, &[source(verified.clone(), false)]).unwrap_err();
        match err {
            SyncError::MissingProvenance { missing, .. } => {
                assert_eq!(missing, vec!["owner", "source", "integrity"])
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(enforce(Mode::Enterprise, false, &[source(verified, true)])
            .unwrap()
            .is_empty());
    }
}
