//! Source resolution
//!
//! Turns one configured source (a local path, or a git repository at a
//! ref) into a flat list of sections plus provenance. Git access goes
//! through an explicit `GitCache` handle and a `GitBackend`.

mod cache;
mod error;
mod git;
mod local;

use std::path::{Component, Path, PathBuf};

use ruleweave_canon::{DocumentHeader, RuleSection};
use serde::{Deserialize, Serialize};

pub use cache::{CacheMeta, CachedCheckout, GitCache, RefKind, StalenessPolicy, DEFAULT_REF};
pub use error::{GitError, SourceError};
pub use git::{CliGit, FetchPhase, FetchPolicy, FetchProgress, FetchRequest, GitBackend};
pub use local::{LoadedDocument, RULE_GLOBS};

/// A configured rule source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    Local {
        path: PathBuf,
    },
    Git {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,

        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,

        /// Subdirectory or file inside the repository
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,

        /// `url` or `url@ref` entries, each resolved as its own source
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        include: Vec<String>,
    },
}

impl SourceSpec {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        SourceSpec::Local { path: path.into() }
    }

    pub fn git(url: impl Into<String>, reference: Option<&str>) -> Self {
        SourceSpec::Git {
            url: Some(url.into()),
            reference: reference.map(str::to_string),
            path: None,
            include: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        match self {
            SourceSpec::Local { path } => {
                if path.as_os_str().is_empty() {
                    return Err(SourceError::InvalidSpec(
                        "local source requires a path".to_string(),
                    ));
                }
            }
            SourceSpec::Git {
                url, path, include, ..
            } => {
                let has_url = url.as_deref().is_some_and(|u| !u.trim().is_empty());
                if !has_url && include.is_empty() {
                    return Err(SourceError::InvalidSpec(
                        "git source requires a url or an include list".to_string(),
                    ));
                }
                if include.iter().any(|entry| entry.trim().is_empty()) {
                    return Err(SourceError::InvalidSpec(
                        "git include entries must not be empty".to_string(),
                    ));
                }
                if let Some(path) = path {
                    let escapes = path.is_absolute()
                        || path.components().any(|c| matches!(c, Component::ParentDir));
                    if escapes {
                        return Err(SourceError::InvalidSpec(format!(
                            "git source path '{}' must stay inside the repository",
                            path.display()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace a git source that has an include list with one child
    /// source per entry. The parent's ref and path are the defaults.
    pub fn expand(&self) -> Vec<SourceSpec> {
        match self {
            SourceSpec::Git {
                reference,
                path,
                include,
                ..
            } if !include.is_empty() => include
                .iter()
                .map(|entry| {
                    let (url, entry_ref) = split_include(entry);
                    SourceSpec::Git {
                        url: Some(url.to_string()),
                        reference: entry_ref.map(str::to_string).or_else(|| reference.clone()),
                        path: path.clone(),
                        include: Vec::new(),
                    }
                })
                .collect(),
            other => vec![other.clone()],
        }
    }

    /// Stable human-readable identity used in conflicts and the lockfile.
    pub fn identity(&self) -> String {
        match self {
            SourceSpec::Local { path } => path.display().to_string(),
            SourceSpec::Git {
                url,
                reference,
                path,
                include,
            } => {
                let base = match url {
                    Some(url) => url.clone(),
                    None => format!("include[{}]", include.join(",")),
                };
                let mut id = format!("{}@{}", base, reference.as_deref().unwrap_or(DEFAULT_REF));
                if let Some(path) = path {
                    id.push(':');
                    id.push_str(&path.display().to_string());
                }
                id
            }
        }
    }
}

/// Split `url@ref`. The `@` counts as a separator when the ref part has
/// no `:` and either has no `/` or follows a `.git` suffix, so
/// `git@host:org/repo.git` and `https://user@host/repo.git` keep their `@`.
fn split_include(entry: &str) -> (&str, Option<&str>) {
    let entry = entry.trim();
    if let Some((url, reference)) = entry.rsplit_once('@') {
        let plausible = !reference.is_empty()
            && !url.is_empty()
            && !reference.contains(':')
            && (!reference.contains('/') || url.ends_with(".git"));
        if plausible {
            return (url, Some(reference));
        }
    }
    (entry, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Git,
}

/// Per-invocation resolution settings.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Base for relative local paths
    pub cwd: PathBuf,
    pub offline: bool,
    pub force_refresh: bool,
}

impl ResolveOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            offline: false,
            force_refresh: false,
        }
    }
}

/// One source, resolved for this invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub identity: String,
    pub sections: Vec<RuleSection>,
    pub source_path: PathBuf,
    pub source_type: SourceType,
    pub commit_sha: Option<String>,
    /// Header of the first canonical document in the source, if any
    pub header: Option<DocumentHeader>,
    pub documents: Vec<LoadedDocument>,
}

type ProgressFn = Box<dyn Fn(&FetchProgress)>;

pub struct SourceResolver {
    cache: GitCache,
    backend: Box<dyn GitBackend>,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResolver")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl SourceResolver {
    /// Resolver that fetches with the `git` command line client.
    pub fn new(cache: GitCache) -> Self {
        Self::with_backend(cache, Box::new(CliGit::default()))
    }

    pub fn with_backend(cache: GitCache, backend: Box<dyn GitBackend>) -> Self {
        Self {
            cache,
            backend,
            progress: None,
        }
    }

    /// Receive progress reports during git fetches.
    pub fn on_progress(mut self, callback: impl Fn(&FetchProgress) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn cache(&self) -> &GitCache {
        &self.cache
    }

    /// Resolve one source. Sources with an include list must be expanded
    /// first (`resolve_all` does this).
    pub fn resolve(
        &self,
        spec: &SourceSpec,
        options: &ResolveOptions,
    ) -> Result<ResolvedSource, SourceError> {
        spec.validate()?;
        match spec {
            SourceSpec::Local { path } => {
                let full = resolve_relative(&options.cwd, path);
                let loaded = local::load_path(
                    &full,
                    "create the file or fix `path` in .ruleweave/config.toml",
                )?;
                Ok(ResolvedSource {
                    identity: spec.identity(),
                    header: loaded.documents.first().map(|d| d.header.clone()),
                    sections: loaded.sections,
                    source_path: full,
                    source_type: SourceType::Local,
                    commit_sha: None,
                    documents: loaded.documents,
                })
            }
            SourceSpec::Git { include, .. } if !include.is_empty() => Err(SourceError::InvalidSpec(
                format!("{} has an include list; expand it before resolving", spec.identity()),
            )),
            SourceSpec::Git {
                url,
                reference,
                path,
                ..
            } => {
                let url = url.as_deref().unwrap_or_default();
                let reference = reference.as_deref().unwrap_or(DEFAULT_REF);
                let policy = FetchPolicy {
                    offline: options.offline,
                    force_refresh: options.force_refresh,
                };
                let silent = |_: &FetchProgress| {};
                let progress: &dyn Fn(&FetchProgress) = match &self.progress {
                    Some(callback) => callback.as_ref(),
                    None => &silent,
                };

                let checkout = git::ensure_checkout(
                    &self.cache,
                    self.backend.as_ref(),
                    progress,
                    url,
                    reference,
                    policy,
                )?;

                let target = match path {
                    Some(sub) => checkout.checkout_dir.join(sub),
                    None => checkout.checkout_dir.clone(),
                };
                let loaded = local::load_path(&target, "check `path` in the git source")?;
                Ok(ResolvedSource {
                    identity: spec.identity(),
                    header: loaded.documents.first().map(|d| d.header.clone()),
                    sections: loaded.sections,
                    source_path: target,
                    source_type: SourceType::Git,
                    commit_sha: Some(checkout.meta.commit_sha),
                    documents: loaded.documents,
                })
            }
        }
    }

    /// Expand includes and resolve every source in declaration order.
    pub fn resolve_all(
        &self,
        specs: &[SourceSpec],
        options: &ResolveOptions,
    ) -> Result<Vec<ResolvedSource>, SourceError> {
        let mut resolved = Vec::new();
        for spec in specs {
            spec.validate()?;
            for child in spec.expand() {
                resolved.push(self.resolve(&child, options)?);
            }
        }
        Ok(resolved)
    }
}

fn resolve_relative(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
