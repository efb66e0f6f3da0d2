//! Lockfile (`.ruleweave/lock.json`)
//!
//! Records what a team or enterprise sync resolved: the bundle hash,
//! each source with its commit, and a content hash per section. `check`
//! recomputes the same record and reports drift.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ruleweave_canon::{hash_serializable, CanonicalizationError, RuleDocument, RuleSection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::{ResolvedSource, SourceType};

/// Schema version for lock.json
pub const SCHEMA_VERSION: u32 = 1;

pub const LOCKFILE_RELATIVE: &str = ".ruleweave/lock.json";

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("no lockfile at {}; run `ruleweave sync` first", path.display())]
    Missing { path: PathBuf },

    #[error("cannot parse lockfile {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("lockfile {} has schema version {found}, expected {}", path.display(), SCHEMA_VERSION)]
    SchemaVersion { path: PathBuf, found: u32 },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSource {
    pub identity: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSection {
    pub fingerprint: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub schema_version: u32,
    pub bundle_hash: String,
    pub sources: Vec<LockedSource>,
    /// Sorted by fingerprint
    pub sections: Vec<LockedSection>,
}

/// One difference between a stored lockfile and the current bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drift {
    SectionAdded { fingerprint: String },
    SectionRemoved { fingerprint: String },
    SectionChanged { fingerprint: String },
    SourceAdded { identity: String },
    SourceRemoved { identity: String },
    SourceMoved {
        identity: String,
        locked: Option<String>,
        current: Option<String>,
    },
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SectionAdded { fingerprint } => write!(f, "section '{}' added", fingerprint),
            Self::SectionRemoved { fingerprint } => write!(f, "section '{}' removed", fingerprint),
            Self::SectionChanged { fingerprint } => write!(f, "section '{}' changed", fingerprint),
            Self::SourceAdded { identity } => write!(f, "source {} added", identity),
            Self::SourceRemoved { identity } => write!(f, "source {} removed", identity),
            Self::SourceMoved {
                identity,
                locked,
                current,
            } => write!(
                f,
                "source {} moved from {} to {}",
                identity,
                locked.as_deref().unwrap_or("-"),
                current.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Hash of a section list, independent of section order.
pub fn bundle_hash(sections: &[RuleSection]) -> Result<String, CanonicalizationError> {
    let mut sorted: Vec<&RuleSection> = sections.iter().collect();
    sorted.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    hash_serializable(&sorted)
}

pub fn lockfile_path(root: &Path) -> PathBuf {
    root.join(LOCKFILE_RELATIVE)
}

impl Lockfile {
    /// Record the merged bundle, before overlays.
    pub fn from_bundle(
        sources: &[ResolvedSource],
        document: &RuleDocument,
    ) -> Result<Self, CanonicalizationError> {
        let mut sections: Vec<LockedSection> = document
            .sections
            .iter()
            .map(|s| LockedSection {
                fingerprint: s.fingerprint.clone(),
                content_hash: s.content_hash(),
            })
            .collect();
        sections.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            bundle_hash: bundle_hash(&document.sections)?,
            sources: sources
                .iter()
                .map(|s| LockedSource {
                    identity: s.identity.clone(),
                    source_type: s.source_type,
                    commit_sha: s.commit_sha.clone(),
                })
                .collect(),
            sections,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self).map(|mut s| {
            s.push('\n');
            s
        })
    }

    /// Load the lockfile under `root`; `Ok(None)` when there is none.
    pub fn read(root: &Path) -> Result<Option<Self>, LockfileError> {
        let path = lockfile_path(root);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LockfileError::Io { path, source }),
        };
        let lock: Self = serde_json::from_str(&text).map_err(|e| LockfileError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if lock.schema_version != SCHEMA_VERSION {
            return Err(LockfileError::SchemaVersion {
                path,
                found: lock.schema_version,
            });
        }
        Ok(Some(lock))
    }

    /// Write atomically (temp file + rename).
    pub fn write(&self, root: &Path) -> Result<(), LockfileError> {
        let path = lockfile_path(root);
        let io_err = |source: io::Error| LockfileError::Io {
            path: path.clone(),
            source,
        };
        let json = self.to_json().map_err(|e| LockfileError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(io_err)?;
        fs::rename(&temp_path, &path).map_err(io_err)?;
        Ok(())
    }

    /// Differences from `self` (the stored lock) to `current`.
    pub fn drift(&self, current: &Lockfile) -> Vec<Drift> {
        let mut drift = Vec::new();

        for locked in &self.sources {
            match current.sources.iter().find(|s| s.identity == locked.identity) {
                None => drift.push(Drift::SourceRemoved {
                    identity: locked.identity.clone(),
                }),
                Some(now) if now.commit_sha != locked.commit_sha => drift.push(Drift::SourceMoved {
                    identity: locked.identity.clone(),
                    locked: locked.commit_sha.clone(),
                    current: now.commit_sha.clone(),
                }),
                Some(_) => {}
            }
        }
        for now in &current.sources {
            if !self.sources.iter().any(|s| s.identity == now.identity) {
                drift.push(Drift::SourceAdded {
                    identity: now.identity.clone(),
                });
            }
        }

        for locked in &self.sections {
            match current.sections.iter().find(|s| s.fingerprint == locked.fingerprint) {
                None => drift.push(Drift::SectionRemoved {
                    fingerprint: locked.fingerprint.clone(),
                }),
                Some(now) if now.content_hash != locked.content_hash => {
                    drift.push(Drift::SectionChanged {
                        fingerprint: locked.fingerprint.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for now in &current.sections {
            if !self.sections.iter().any(|s| s.fingerprint == now.fingerprint) {
                drift.push(Drift::SectionAdded {
                    fingerprint: now.fingerprint.clone(),
                });
            }
        }

        drift
    }
}
