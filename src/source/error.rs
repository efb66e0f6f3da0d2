use std::io;
use std::path::PathBuf;

use ruleweave_canon::CanonicalizationError;
use thiserror::Error;

/// Errors from resolving a rule source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source not found: {}\n  hint: {hint}", path.display())]
    NotFound { path: PathBuf, hint: String },

    #[error("failed to fetch {url} at {reference}: {message}")]
    Network {
        url: String,
        reference: String,
        message: String,
    },

    #[error("offline: no cached copy of {url} at {reference}")]
    OfflineCacheMiss { url: String, reference: String },

    #[error("invalid rule document {}: {message}", path.display())]
    Document { path: PathBuf, message: String },

    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid source: {0}")]
    InvalidSpec(String),
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from a git backend.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("could not run git: {0}")]
    Spawn(#[source] io::Error),

    #[error("git {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("{0}")]
    Other(String),
}
