//! Loading rules from files and directories

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ruleweave_canon::{
    fingerprint_from_heading, verify_integrity, DocumentHeader, IntegrityStatus, RuleDocument,
    RuleSection,
};
use serde_json::Value;
use walkdir::WalkDir;

use super::error::SourceError;
use crate::markdown::{parse_markdown, split_front_matter};

/// File patterns picked up when a source points at a directory
pub const RULE_GLOBS: &[&str] = &[
    "**/*.md",
    "**/*.mdc",
    "**/*.markdown",
    "**/*.json",
    "**/*.yaml",
    "**/*.yml",
];

/// Vendor bag key for Cursor front matter
const CURSOR_VENDOR: &str = "cursor";

/// A canonical document loaded from disk, with its integrity status.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub header: DocumentHeader,
    pub integrity: IntegrityStatus,
}

#[derive(Debug, Default)]
pub(crate) struct Loaded {
    pub sections: Vec<RuleSection>,
    pub documents: Vec<LoadedDocument>,
}

fn rule_globs() -> Result<GlobSet, SourceError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in RULE_GLOBS {
        let glob = Glob::new(pattern)
            .map_err(|e| SourceError::InvalidSpec(format!("bad glob {}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SourceError::InvalidSpec(e.to_string()))
}

/// Load every rule file under `path` (a file or a directory).
pub(crate) fn load_path(path: &Path, hint: &str) -> Result<Loaded, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound {
            path: absolute(path),
            hint: hint.to_string(),
        });
    }

    let mut loaded = Loaded::default();

    if path.is_file() {
        load_file(path, &mut loaded)?;
    } else {
        let globs = rule_globs()?;
        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
                SourceError::io(at, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
            if globs.is_match(relative) {
                load_file(entry.path(), &mut loaded)?;
            }
        }
    }

    dedupe_fingerprints(&mut loaded.sections);
    log::debug!(
        "loaded {} section(s) and {} document(s) from {}",
        loaded.sections.len(),
        loaded.documents.len(),
        path.display()
    );
    Ok(loaded)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn load_file(path: &Path, loaded: &mut Loaded) -> Result<(), SourceError> {
    let text = fs::read_to_string(path).map_err(|e| SourceError::io(path, e))?;

    match extension(path).as_str() {
        "md" | "markdown" => {
            let parsed = parse_markdown(&text);
            if parsed.generated {
                log::debug!("skipping generated file {}", path.display());
                return Ok(());
            }
            loaded.sections.extend(parsed.rule_sections());
        }
        "mdc" => loaded.sections.extend(load_mdc(path, &text)?),
        "json" => {
            let value: Value = serde_json::from_str(&text).map_err(|e| SourceError::Document {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            load_document(path, value, loaded)?;
        }
        "yaml" | "yml" => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(&text).map_err(|e| SourceError::Document {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            let value = serde_json::to_value(yaml).map_err(|e| SourceError::Document {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            load_document(path, value, loaded)?;
        }
        other => {
            return Err(SourceError::InvalidSpec(format!(
                "unsupported rule file type '.{}': {}",
                other,
                path.display()
            )))
        }
    }
    Ok(())
}

/// Cursor rule files: YAML front matter plus a markdown body. Front matter
/// lands in the `cursor` vendor bag of every section in the file; a body
/// without headings becomes one section named after the file.
fn load_mdc(path: &Path, text: &str) -> Result<Vec<RuleSection>, SourceError> {
    let (front_matter, body) = split_front_matter(text).map_err(|message| SourceError::Document {
        path: path.to_path_buf(),
        message,
    })?;

    let parsed = parse_markdown(&body);
    if parsed.generated {
        log::debug!("skipping generated file {}", path.display());
        return Ok(Vec::new());
    }

    let mut sections = parsed.rule_sections();
    if sections.is_empty() && !parsed.preamble.is_empty() {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("rule")
            .to_string();
        let heading = front_matter
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| stem.replace(['-', '_'], " "));
        let fingerprint = fingerprint_from_heading(&stem);
        sections.push(RuleSection::new(heading, 2, parsed.preamble.clone(), fingerprint));
    }

    for section in &mut sections {
        for (key, value) in &front_matter {
            section.vendor.insert(CURSOR_VENDOR, key, value.clone());
        }
    }
    Ok(sections)
}

fn load_document(path: &Path, value: Value, loaded: &mut Loaded) -> Result<(), SourceError> {
    let integrity = verify_integrity(&value)?;
    let document = RuleDocument::from_value(value).map_err(|e| SourceError::Document {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    document.validate().map_err(|e| SourceError::Document {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    loaded.documents.push(LoadedDocument {
        path: path.to_path_buf(),
        header: document.header(),
        integrity,
    });
    loaded.sections.extend(document.sections);
    Ok(())
}

/// Make fingerprints unique within one source by suffixing repeats.
fn dedupe_fingerprints(sections: &mut [RuleSection]) {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for section in sections.iter_mut() {
        let count = seen.entry(section.fingerprint.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            let renamed = format!("{}-{}", section.fingerprint, count);
            log::warn!(
                "duplicate fingerprint '{}' in one source; renamed to '{}'",
                section.fingerprint,
                renamed
            );
            section.fingerprint = renamed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleweave_canon::seal_document;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_path_is_not_found() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.md");
        let err = load_path(&missing, "create the file").unwrap_err();
        match err {
            SourceError::NotFound { path, hint } => {
                assert!(path.is_absolute());
                assert_eq!(hint, "create the file");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_walk_sorted_and_hidden_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.md"), "## Style\nUse rustfmt.\n").unwrap();
        fs::write(temp.path().join("a.md"), "## Testing\nRun tests.\n").unwrap();
        fs::write(temp.path().join("notes.txt"), "## Ignored\n").unwrap();
        fs::create_dir(temp.path().join(".hidden")).unwrap();
        fs::write(temp.path().join(".hidden/c.md"), "## Secret\n").unwrap();

        let loaded = load_path(temp.path(), "").unwrap();
        let headings: Vec<_> = loaded.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Testing", "Style"]);
    }

    #[test]
    fn test_json_document_with_integrity() {
        let temp = TempDir::new().unwrap();
        let doc = json!({
            "id": "team-rules",
            "version": "1.0.0",
            "spec_version": "1",
            "owner": "platform",
            "sections": [
                {"heading": "Testing", "level": 2, "content": "Run tests.", "fingerprint": "testing-001"}
            ],
            "integrity": {"algo": "jcs-sha256", "value": "<computed>"}
        });
        let sealed = seal_document(&doc).unwrap();
        let path = temp.path().join("rules.json");
        fs::write(&path, serde_json::to_string_pretty(&sealed).unwrap()).unwrap();

        let loaded = load_path(&path, "").unwrap();
        assert_eq!(loaded.sections.len(), 1);
        assert_eq!(loaded.sections[0].fingerprint, "testing-001");
        assert_eq!(loaded.documents.len(), 1);
        assert!(loaded.documents[0].integrity.is_verified());
        assert_eq!(loaded.documents[0].header.owner.as_deref(), Some("platform"));
    }

    #[test]
    fn test_yaml_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rules.yaml");
        fs::write(
            &path,
            "id: yaml-rules\nversion: 0.2.0\nspec_version: \"1\"\nsections:\n  - heading: Style\n    level: 2\n    content: Use rustfmt.\n    fingerprint: style\n",
        )
        .unwrap();

        let loaded = load_path(&path, "").unwrap();
        assert_eq!(loaded.sections[0].heading, "Style");
        assert!(matches!(
            loaded.documents[0].integrity,
            IntegrityStatus::Missing { .. }
        ));
    }

    #[test]
    fn test_invalid_document_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, r#"{"id": "x", "version": "not-semver", "spec_version": "1", "sections": []}"#).unwrap();

        let err = load_path(&path, "").unwrap_err();
        assert!(matches!(err, SourceError::Document { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_mdc_front_matter_into_vendor_bag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rust-style.mdc");
        fs::write(
            &path,
            "---\ndescription: Rust style\nglobs: \"**/*.rs\"\nalwaysApply: false\n---\nPrefer iterators over index loops.\n",
        )
        .unwrap();

        let loaded = load_path(&path, "").unwrap();
        let section = &loaded.sections[0];
        assert_eq!(section.heading, "Rust style");
        assert_eq!(section.fingerprint, "rust-style");
        let cursor = section.vendor.get("cursor").unwrap();
        assert_eq!(cursor["globs"], "**/*.rs");
        assert_eq!(cursor["alwaysApply"], false);
    }

    #[test]
    fn test_generated_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        let generated = format!("{}\n\n## Testing\nRun tests.\n", crate::markdown::GENERATED_MARKER);
        fs::write(temp.path().join("AGENTS.md"), generated).unwrap();
        fs::write(temp.path().join("rules.md"), "## Style\nx\n").unwrap();

        let loaded = load_path(temp.path(), "").unwrap();
        assert_eq!(loaded.sections.len(), 1);
        assert_eq!(loaded.sections[0].heading, "Style");
    }

    #[test]
    fn test_duplicates_across_files_renamed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.md"), "## Testing\none\n").unwrap();
        fs::write(temp.path().join("b.md"), "## Testing\ntwo\n").unwrap();

        let loaded = load_path(temp.path(), "").unwrap();
        let fps: Vec<_> = loaded.sections.iter().map(|s| s.fingerprint.as_str()).collect();
        assert_eq!(fps, vec!["testing", "testing-2"]);
    }
}
