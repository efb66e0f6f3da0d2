//! Top-level error type for engine operations
//!
//! Every engine failure surfaces as a typed `SyncError`; the engine
//! never exits the process or writes to the terminal itself.

use std::io;
use std::path::PathBuf;

use ruleweave_canon::{CanonicalizationError, DocumentError};
use thiserror::Error;

use crate::bundle::Conflict;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::lockfile::LockfileError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("source not found: {}\n  hint: {hint}", path.display())]
    NotFound { path: PathBuf, hint: String },

    #[error("failed to fetch {url} at {reference}: {message}")]
    Network {
        url: String,
        reference: String,
        message: String,
    },

    #[error("{} merge conflict(s): {}", conflicts.len(), describe_conflicts(conflicts))]
    Conflict { conflicts: Vec<Conflict> },

    #[error("integrity mismatch for {subject}: stored {stored}, computed {computed}")]
    IntegrityMismatch {
        subject: String,
        stored: String,
        computed: String,
    },

    #[error("{subject} is missing required {mode} mode fields: {}", missing.join(", "))]
    MissingProvenance {
        subject: String,
        mode: String,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("'{}' differs between {}", c.fingerprint, c.sources.join(" and ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Conflict { .. } => 2,
            Self::IntegrityMismatch { .. } | Self::MissingProvenance { .. } => 3,
            _ => 1,
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound { path, hint } => Self::NotFound { path, hint },
            SourceError::Network {
                url,
                reference,
                message,
            } => Self::Network {
                url,
                reference,
                message,
            },
            SourceError::OfflineCacheMiss { url, reference } => Self::Network {
                url,
                reference,
                message: "offline mode is on and no cached copy exists".to_string(),
            },
            SourceError::Document { path, message } => Self::Document(DocumentError::Parse(
                format!("{}: {}", path.display(), message),
            )),
            SourceError::Canonicalization(err) => Self::Canonicalization(err),
            SourceError::Io { path, source } => Self::Io { path, source },
            SourceError::InvalidSpec(message) => {
                Self::Config(ConfigError::ValidationError(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_sources() {
        let err = SyncError::Conflict {
            conflicts: vec![Conflict {
                fingerprint: "testing-001".to_string(),
                heading: "Testing".to_string(),
                sources: vec!["rules/a.md".to_string(), "rules/b.md".to_string()],
                content_hashes: vec![],
            }],
        };
        let message = err.to_string();
        assert!(message.contains("testing-001"));
        assert!(message.contains("rules/a.md and rules/b.md"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_offline_miss_maps_to_network() {
        let err: SyncError = SourceError::OfflineCacheMiss {
            url: "https://example.com/rules.git".to_string(),
            reference: "main".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Network { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
