//! Export pipeline
//!
//! Each target format is a `Transformer` that renders the canonical
//! document into files, merging with what is already on disk. The
//! pipeline writes only files whose bytes changed and removes generated
//! files that no longer have a canonical counterpart.

mod formats;
mod hash;
mod writer;

use std::io;
use std::path::{Path, PathBuf};

use ruleweave_canon::{CanonicalizationError, RuleDocument, RuleSection};
use serde::Serialize;
use thiserror::Error;

use crate::matcher::MatchStats;

pub use formats::{
    transformer_for, AggregatedMarkdown, CursorRules, McpConfig, RulesIndex, KNOWN_FORMATS,
};
pub use hash::content_hash;
pub use writer::{AtomicFileWriter, BackupHook, FileWriter, NoBackup};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format '{0}'")]
    UnknownFormat(String),

    #[error("{format}: invalid vendor data on '{fingerprint}': {message}")]
    Vendor {
        format: String,
        fingerprint: String,
        message: String,
    },

    #[error("{format}: cannot merge with {}: {message}", path.display())]
    Merge {
        format: String,
        path: PathBuf,
        message: String,
    },

    #[error("{format}: fingerprint '{fingerprint}' does not name a file under {dir}")]
    UnsafePath {
        format: String,
        fingerprint: String,
        dir: String,
    },

    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error("backup of {} failed: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FidelityKind {
    /// Machine checks the format cannot express
    MachineChecks,
    /// Autofix hint dropped
    AutofixHint,
    /// Vendor data meant for another target
    ForeignVendor,
    /// Field outside the canonical model
    UnsupportedField,
}

/// Something the target format could not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FidelityNote {
    pub format: String,
    pub fingerprint: String,
    pub kind: FidelityKind,
    pub message: String,
}

/// A file a transformer wants on disk, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub files: Vec<RenderedFile>,
    /// Previously generated files that should be removed
    pub stale_files: Vec<PathBuf>,
    pub match_stats: MatchStats,
    pub fidelity_notes: Vec<FidelityNote>,
}

/// Read-only view of the project handed to transformers.
pub struct ExportContext<'a> {
    root: &'a Path,
    files: &'a dyn FileWriter,
    pub managed_sections: &'a [String],
}

impl<'a> ExportContext<'a> {
    pub fn new(root: &'a Path, files: &'a dyn FileWriter, managed_sections: &'a [String]) -> Self {
        Self {
            root,
            files,
            managed_sections,
        }
    }

    /// Read a file relative to the project root.
    pub fn read(&self, relative: &Path) -> Result<Option<String>, ExportError> {
        let path = self.root.join(relative);
        self.files
            .read(&path)
            .map_err(|source| ExportError::Io { path, source })
    }

    /// List files in a directory relative to the project root; returned
    /// paths are relative too.
    pub fn list(&self, relative_dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
        let dir = self.root.join(relative_dir);
        let listed = self
            .files
            .list(&dir)
            .map_err(|source| ExportError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(listed
            .into_iter()
            .filter_map(|p| p.strip_prefix(self.root).ok().map(Path::to_path_buf))
            .collect())
    }
}

/// One target format.
pub trait Transformer {
    /// Format name as used in configuration
    fn name(&self) -> &'static str;

    /// Key of this target's entries in section vendor bags
    fn vendor_key(&self) -> &'static str;

    fn render(&self, document: &RuleDocument, ctx: &ExportContext<'_>) -> Result<Rendered, ExportError>;

    /// Hash of the exported content, independent of section order.
    fn content_hash(&self, sections: &[RuleSection]) -> Result<String, ExportError> {
        Ok(content_hash(self.name(), sections)?)
    }
}

/// Outcome of exporting one format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    pub format: String,
    pub files_written: Vec<PathBuf>,
    pub files_unchanged: Vec<PathBuf>,
    pub files_removed: Vec<PathBuf>,
    pub content_hash: String,
    pub fidelity_notes: Vec<FidelityNote>,
    pub match_stats: MatchStats,
}

pub struct ExportPipeline {
    root: PathBuf,
    writer: Box<dyn FileWriter>,
    backup: Box<dyn BackupHook>,
    managed_sections: Vec<String>,
    dry_run: bool,
}

impl ExportPipeline {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer: Box::new(AtomicFileWriter),
            backup: Box::new(NoBackup),
            managed_sections: Vec::new(),
            dry_run: false,
        }
    }

    pub fn with_writer(mut self, writer: Box<dyn FileWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_backup(mut self, backup: Box<dyn BackupHook>) -> Self {
        self.backup = backup;
        self
    }

    pub fn managed_sections(mut self, headings: Vec<String>) -> Self {
        self.managed_sections = headings;
        self
    }

    /// Compute results without touching the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Export every named format in order.
    pub fn export_all(
        &self,
        formats: &[String],
        document: &RuleDocument,
    ) -> Result<Vec<ExportResult>, ExportError> {
        formats
            .iter()
            .map(|name| {
                let transformer =
                    transformer_for(name).ok_or_else(|| ExportError::UnknownFormat(name.clone()))?;
                self.export(transformer.as_ref(), document)
            })
            .collect()
    }

    pub fn export(
        &self,
        transformer: &dyn Transformer,
        document: &RuleDocument,
    ) -> Result<ExportResult, ExportError> {
        let ctx = ExportContext::new(&self.root, self.writer.as_ref(), &self.managed_sections);
        let rendered = transformer.render(document, &ctx)?;
        let content_hash = transformer.content_hash(&document.sections)?;

        let mut result = ExportResult {
            format: transformer.name().to_string(),
            files_written: Vec::new(),
            files_unchanged: Vec::new(),
            files_removed: Vec::new(),
            content_hash,
            fidelity_notes: rendered.fidelity_notes,
            match_stats: rendered.match_stats,
        };

        for file in rendered.files {
            let path = self.root.join(&file.path);
            let existing = self
                .writer
                .read(&path)
                .map_err(|source| ExportError::Io {
                    path: path.clone(),
                    source,
                })?;

            if existing.as_deref() == Some(file.contents.as_str()) {
                result.files_unchanged.push(file.path);
                continue;
            }

            if !self.dry_run {
                if existing.is_some() {
                    self.backup
                        .before_overwrite(&path)
                        .map_err(|source| ExportError::Backup {
                            path: path.clone(),
                            source,
                        })?;
                }
                self.writer
                    .write(&path, file.contents.as_bytes())
                    .map_err(|source| ExportError::Io {
                        path: path.clone(),
                        source,
                    })?;
                log::debug!("{}: wrote {}", result.format, file.path.display());
            }
            result.files_written.push(file.path);
        }

        for stale in rendered.stale_files {
            if self.dry_run {
                result.files_removed.push(stale);
                continue;
            }
            let path = self.root.join(&stale);
            match self.writer.remove(&path) {
                Ok(()) => {
                    log::info!("{}: removed stale {}", result.format, stale.display());
                    result.files_removed.push(stale);
                }
                Err(e) => log::warn!(
                    "{}: could not remove stale {}: {}",
                    result.format,
                    path.display(),
                    e
                ),
            }
        }

        for note in &result.fidelity_notes {
            log::debug!("{}: {} ({})", note.format, note.message, note.fingerprint);
        }

        Ok(result)
    }
}

/// Fidelity notes for a section exported to a format that carries only
/// heading, content and its own vendor bag.
pub(crate) fn lossy_fields(format: &str, vendor_key: &str, section: &RuleSection) -> Vec<FidelityNote> {
    let note = |kind, message: String| FidelityNote {
        format: format.to_string(),
        fingerprint: section.fingerprint.clone(),
        kind,
        message,
    };

    let mut notes = Vec::new();
    if !section.checks.is_empty() {
        notes.push(note(
            FidelityKind::MachineChecks,
            format!("{} machine check(s) not representable", section.checks.len()),
        ));
    }
    if section.autofix.is_some() {
        notes.push(note(
            FidelityKind::AutofixHint,
            "autofix hint dropped".to_string(),
        ));
    }
    for target in section.vendor.targets() {
        if target != vendor_key {
            notes.push(note(
                FidelityKind::ForeignVendor,
                format!("vendor data for '{}' not exported", target),
            ));
        }
    }
    for key in section.extra.keys() {
        notes.push(note(
            FidelityKind::UnsupportedField,
            format!("field '{}' not exported", key),
        ));
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleweave_canon::MachineCheck;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn document() -> RuleDocument {
        RuleDocument::new(
            "rules",
            "1.0.0",
            vec![
                RuleSection::new("Testing", 2, "Run tests.", "testing"),
                RuleSection::new("Style", 2, "Use rustfmt.", "style"),
            ],
        )
    }

    struct RecordingBackup(Rc<RefCell<Vec<PathBuf>>>);

    impl BackupHook for RecordingBackup {
        fn before_overwrite(&self, path: &Path) -> io::Result<()> {
            self.0.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_second_export_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let pipeline = ExportPipeline::new(temp.path());
        let formats: Vec<String> = KNOWN_FORMATS.iter().map(|s| s.to_string()).collect();

        let first = pipeline.export_all(&formats, &document()).unwrap();
        assert!(first.iter().all(|r| !r.files_written.is_empty()));

        let second = pipeline.export_all(&formats, &document()).unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert!(b.files_written.is_empty(), "{} rewrote files", b.format);
            assert_eq!(a.content_hash, b.content_hash);
        }
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let pipeline = ExportPipeline::new(temp.path()).dry_run(true);
        let result = pipeline.export(&AggregatedMarkdown::agents(), &document()).unwrap();

        assert_eq!(result.files_written, vec![PathBuf::from("AGENTS.md")]);
        assert!(!temp.path().join("AGENTS.md").exists());
    }

    #[test]
    fn test_backup_called_before_overwrite() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("AGENTS.md"), "## Testing\nold\n").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let pipeline = ExportPipeline::new(temp.path())
            .with_backup(Box::new(RecordingBackup(Rc::clone(&seen))));
        pipeline.export(&AggregatedMarkdown::agents(), &document()).unwrap();

        assert_eq!(*seen.borrow(), vec![temp.path().join("AGENTS.md")]);
    }

    #[test]
    fn test_unknown_format() {
        let temp = TempDir::new().unwrap();
        let err = ExportPipeline::new(temp.path())
            .export_all(&["word-doc".to_string()], &document())
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownFormat(_)));
    }

    #[test]
    fn test_lossy_fields() {
        let mut section = RuleSection::new("Testing", 2, "Run tests.", "testing")
            .with_vendor("cursor", "globs", json!("**/*.rs"))
            .with_vendor("agents", "exclude", json!(false));
        section.autofix = Some("run cargo fmt".to_string());
        section.checks.push(MachineCheck {
            id: "fmt".to_string(),
            kind: "command".to_string(),
            params: BTreeMap::new(),
        });
        section.extra.insert("owner_note".to_string(), json!("qa"));

        let notes = lossy_fields("agents-md", "agents", &section);
        let kinds: Vec<_> = notes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FidelityKind::MachineChecks,
                FidelityKind::AutofixHint,
                FidelityKind::ForeignVendor,
                FidelityKind::UnsupportedField
            ]
        );
    }
}
