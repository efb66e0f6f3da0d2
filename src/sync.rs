//! Sync orchestration
//!
//! resolve sources -> mode policy -> merge -> overlays -> export -> lockfile

use std::path::{Path, PathBuf};

use ruleweave_canon::RuleDocument;
use serde::Serialize;

use crate::bundle::merge_all;
use crate::config::{Mode, SyncConfig};
use crate::error::SyncError;
use crate::export::{ExportPipeline, ExportResult};
use crate::lockfile::{lockfile_path, Drift, Lockfile, LockfileError};
use crate::overlay::{apply_to_document, OverlayHealth};
use crate::policy;
use crate::source::{
    GitCache, ResolveOptions, ResolvedSource, SourceResolver, SourceType, StalenessPolicy,
};

/// Cache location used when neither config nor environment names one
const FALLBACK_CACHE_DIR: &str = ".ruleweave/cache/git";

/// Per-invocation switches, usually straight from the command line.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Project root; relative paths resolve against it
    pub root: PathBuf,
    pub offline: bool,
    pub force_refresh: bool,
    pub dry_run: bool,
    pub allow_integrity_bypass: bool,
}

impl SyncOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            offline: false,
            force_refresh: false,
            dry_run: false,
            allow_integrity_bypass: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub identity: String,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub sections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub mode: Mode,
    pub dry_run: bool,
    pub bundle_hash: String,
    pub sources: Vec<SourceSummary>,
    pub exports: Vec<ExportResult>,
    pub overlays: Vec<OverlayHealth>,
    pub lockfile_written: bool,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn files_written(&self) -> usize {
        self.exports.iter().map(|e| e.files_written.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub bundle_hash: String,
    pub drift: Vec<Drift>,
}

fn cache_root(config: &SyncConfig, project_root: &Path) -> PathBuf {
    match &config.git.cache_dir {
        Some(dir) if dir.is_relative() => project_root.join(dir),
        Some(dir) => dir.clone(),
        None => GitCache::default_root().unwrap_or_else(|| project_root.join(FALLBACK_CACHE_DIR)),
    }
}

/// Merged sources before overlays, after policy and conflict checks.
struct Bundle {
    sources: Vec<ResolvedSource>,
    document: RuleDocument,
    warnings: Vec<String>,
}

#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    resolver: SourceResolver,
}

impl SyncEngine {
    /// Engine with a git cache built from the config's `git` settings.
    /// Relative cache paths resolve against the working directory.
    pub fn new(config: SyncConfig) -> Self {
        Self::for_project(config, Path::new("."))
    }

    /// Like `new`, with relative cache paths resolved against `project_root`.
    pub fn for_project(config: SyncConfig, project_root: &Path) -> Self {
        let root = cache_root(&config, project_root);
        let policy = StalenessPolicy::from_hours(
            config.git.branch_check_interval_hours,
            config.git.tag_check_interval_hours,
        );
        let resolver = SourceResolver::new(GitCache::new(root, policy));
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: SyncConfig, resolver: SourceResolver) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn bundle(&self, options: &SyncOptions) -> Result<Bundle, SyncError> {
        let resolve = ResolveOptions {
            cwd: options.root.clone(),
            offline: options.offline || self.config.git.offline,
            force_refresh: options.force_refresh,
        };
        let sources = self.resolver.resolve_all(&self.config.sources, &resolve)?;
        log::debug!("resolved {} source(s)", sources.len());

        let bypass = options.allow_integrity_bypass || self.config.sync.allow_integrity_bypass;
        let mut warnings = policy::enforce(self.config.mode, bypass, &sources)?;

        let merged = merge_all(&sources)?;
        if merged.has_conflicts() {
            return Err(SyncError::Conflict {
                conflicts: merged.conflicts,
            });
        }
        for warning in &merged.warnings {
            log::warn!("{}", warning);
            warnings.push(warning.to_string());
        }
        merged.document.validate()?;

        Ok(Bundle {
            sources,
            document: merged.document,
            warnings,
        })
    }

    /// Resolve, merge, patch and export every configured format.
    pub fn run(&self, options: &SyncOptions) -> Result<SyncReport, SyncError> {
        let Bundle {
            sources,
            document,
            mut warnings,
        } = self.bundle(options)?;
        let lock = Lockfile::from_bundle(&sources, &document)?;

        let (patched, application) = apply_to_document(&document, &self.config.overlays.overrides)?;
        for health in application.health.iter().filter(|h| !h.is_healthy()) {
            warnings.push(format!(
                "overlay '{}' is {}: {}",
                health.selector,
                health.status.as_str(),
                health.reason.as_deref().unwrap_or("no match")
            ));
        }
        patched.validate()?;

        let pipeline = ExportPipeline::new(&options.root)
            .managed_sections(self.config.sync.managed_sections.clone())
            .dry_run(options.dry_run);
        let exports = pipeline.export_all(&self.config.exporters, &patched)?;
        for export in &exports {
            log::info!(
                "{}: {} written, {} unchanged, {} removed",
                export.format,
                export.files_written.len(),
                export.files_unchanged.len(),
                export.files_removed.len()
            );
        }

        let mut lockfile_written = false;
        if self.config.mode.writes_lockfile() && !options.dry_run {
            match lock.write(&options.root) {
                Ok(()) => lockfile_written = true,
                Err(e) => {
                    let warning = format!("lockfile not written: {}", e);
                    log::warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(SyncReport {
            mode: self.config.mode,
            dry_run: options.dry_run,
            bundle_hash: lock.bundle_hash,
            sources: sources
                .iter()
                .map(|s| SourceSummary {
                    identity: s.identity.clone(),
                    source_type: s.source_type,
                    commit_sha: s.commit_sha.clone(),
                    sections: s.sections.len(),
                })
                .collect(),
            exports,
            overlays: application.health,
            lockfile_written,
            warnings,
        })
    }

    /// Compare the current bundle against the stored lockfile.
    ///
    /// Any drift is an integrity mismatch.
    pub fn check(&self, options: &SyncOptions) -> Result<CheckReport, SyncError> {
        let stored = Lockfile::read(&options.root)?.ok_or_else(|| LockfileError::Missing {
            path: lockfile_path(&options.root),
        })?;
        let bundle = self.bundle(options)?;
        let current = Lockfile::from_bundle(&bundle.sources, &bundle.document)?;

        let drift = stored.drift(&current);
        if !drift.is_empty() || stored.bundle_hash != current.bundle_hash {
            for item in &drift {
                log::warn!("drift: {}", item);
            }
            return Err(SyncError::IntegrityMismatch {
                subject: lockfile_path(&options.root).display().to_string(),
                stored: stored.bundle_hash,
                computed: current.bundle_hash,
            });
        }

        Ok(CheckReport {
            bundle_hash: current.bundle_hash,
            drift,
        })
    }

    /// Health of each configured overlay against the merged bundle.
    pub fn overlays(&self, options: &SyncOptions) -> Result<Vec<OverlayHealth>, SyncError> {
        let bundle = self.bundle(options)?;
        let (_, application) = apply_to_document(&bundle.document, &self.config.overlays.overrides)?;
        Ok(application.health)
    }
}
