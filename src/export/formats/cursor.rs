//! Cursor project rules (`.cursor/rules/<fingerprint>.mdc`)

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ruleweave_canon::{RuleDocument, RuleSection};
use serde_json::{Map, Value};

use super::{merge_markdown, section_file, stale_generated, vendor_error};
use crate::export::{lossy_fields, ExportContext, ExportError, Rendered, RenderedFile, Transformer};
use crate::markdown::{render_front_matter, split_front_matter};

const RULES_DIR: &str = ".cursor/rules";
const NAME: &str = "cursor";

/// One `.mdc` file per section.
///
/// Vendor bag keys: `description` (string), `globs` (string or list of
/// strings), `alwaysApply` (bool, defaults to true without globs). Other
/// keys pass through into the front matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorRules;

impl CursorRules {
    fn front_matter(&self, section: &RuleSection) -> Result<Map<String, Value>, ExportError> {
        let empty = Map::new();
        let bag = section.vendor.get(NAME).unwrap_or(&empty);
        let mut fields = Map::new();

        let description = match bag.get("description") {
            None => section.heading.clone(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(vendor_error(NAME, section, "'description' must be a string")),
        };
        fields.insert("description".to_string(), Value::String(description));

        let globs = bag.get("globs");
        match globs {
            None => {}
            Some(Value::String(_)) => {}
            Some(Value::Array(items)) if items.iter().all(Value::is_string) => {}
            Some(_) => {
                return Err(vendor_error(
                    NAME,
                    section,
                    "'globs' must be a string or a list of strings",
                ))
            }
        }
        if let Some(globs) = globs {
            fields.insert("globs".to_string(), globs.clone());
        }

        let always_apply = match bag.get("alwaysApply") {
            None => globs.is_none(),
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(vendor_error(NAME, section, "'alwaysApply' must be a boolean")),
        };
        fields.insert("alwaysApply".to_string(), Value::Bool(always_apply));

        for (key, value) in bag {
            if !fields.contains_key(key) {
                fields.insert(key.clone(), value.clone());
            }
        }
        Ok(fields)
    }
}

impl Transformer for CursorRules {
    fn name(&self) -> &'static str {
        NAME
    }

    fn vendor_key(&self) -> &'static str {
        NAME
    }

    fn render(&self, document: &RuleDocument, ctx: &ExportContext<'_>) -> Result<Rendered, ExportError> {
        let mut rendered = Rendered::default();
        let mut keep = BTreeSet::new();

        for section in &document.sections {
            let fields = self.front_matter(section)?;
            rendered
                .fidelity_notes
                .extend(lossy_fields(NAME, NAME, section));

            let path = section_file(NAME, RULES_DIR, section, "mdc")?;
            let existing_body = match ctx.read(&path)? {
                Some(existing) => Some(
                    split_front_matter(&existing)
                        .map_err(|message| merge_error(&path, message))?
                        .1,
                ),
                None => None,
            };

            let (body, outcome) = merge_markdown(
                existing_body.as_deref(),
                std::slice::from_ref(section),
                "",
                ctx.managed_sections,
            );
            rendered.match_stats.absorb(&outcome.stats);

            let header = render_front_matter(&fields)
                .map_err(|message| vendor_error(NAME, section, message))?;
            keep.insert(path.clone());
            rendered.files.push(RenderedFile {
                path,
                contents: format!("{}{}", header, body),
            });
        }

        rendered.stale_files = stale_generated(ctx, Path::new(RULES_DIR), "mdc", &keep)?;
        Ok(rendered)
    }
}

fn merge_error(path: &Path, message: String) -> ExportError {
    ExportError::Merge {
        format: NAME.to_string(),
        path: PathBuf::from(path),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{AtomicFileWriter, ExportPipeline};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn document() -> RuleDocument {
        RuleDocument::new(
            "rules",
            "1.0.0",
            vec![
                RuleSection::new("Testing", 2, "Run tests.", "testing"),
                RuleSection::new("Rust Style", 2, "Use rustfmt.", "rust-style")
                    .with_vendor("cursor", "globs", json!(["**/*.rs"])),
            ],
        )
    }

    #[test]
    fn test_front_matter_defaults() {
        let temp = TempDir::new().unwrap();
        let ctx = ExportContext::new(temp.path(), &AtomicFileWriter, &[]);
        let rendered = CursorRules.render(&document(), &ctx).unwrap();

        assert_eq!(rendered.files.len(), 2);
        let testing = &rendered.files[0];
        assert_eq!(testing.path, PathBuf::from(".cursor/rules/testing.mdc"));
        assert!(testing.contents.starts_with("---\n"));
        assert!(testing.contents.contains("alwaysApply: true"));
        assert!(testing.contents.contains("description: Testing"));

        let style = &rendered.files[1];
        assert!(style.contents.contains("alwaysApply: false"));
        assert!(style.contents.contains("**/*.rs"));
        assert!(style.contents.contains("## Rust Style\n\nUse rustfmt.\n"));
    }

    #[test]
    fn test_invalid_globs() {
        let temp = TempDir::new().unwrap();
        let ctx = ExportContext::new(temp.path(), &AtomicFileWriter, &[]);
        let doc = RuleDocument::new(
            "rules",
            "1.0.0",
            vec![RuleSection::new("Testing", 2, "x", "testing").with_vendor("cursor", "globs", json!(3))],
        );
        let err = CursorRules.render(&doc, &ctx).unwrap_err();
        assert!(matches!(err, ExportError::Vendor { .. }));
    }

    #[test]
    fn test_stale_generated_removed_foreign_kept() {
        let temp = TempDir::new().unwrap();
        let pipeline = ExportPipeline::new(temp.path());
        pipeline.export(&CursorRules, &document()).unwrap();

        let dir = temp.path().join(RULES_DIR);
        fs::write(dir.join("handwritten.mdc"), "---\ndescription: mine\n---\n## Mine\n").unwrap();

        let smaller = RuleDocument::new(
            "rules",
            "1.0.1",
            vec![RuleSection::new("Testing", 2, "Run tests.", "testing")],
        );
        let result = pipeline.export(&CursorRules, &smaller).unwrap();

        assert_eq!(result.files_removed, vec![PathBuf::from(".cursor/rules/rust-style.mdc")]);
        assert!(!dir.join("rust-style.mdc").exists());
        assert!(dir.join("handwritten.mdc").exists());
        assert!(dir.join("testing.mdc").exists());
    }

    #[test]
    fn test_fingerprint_cannot_escape_rules_dir() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let doc = RuleDocument::new(
            "rules",
            "1.0.0",
            vec![RuleSection::new("Escaped", 2, "x", "../../../escaped")],
        );

        let err = ExportPipeline::new(&project).export(&CursorRules, &doc).unwrap_err();
        assert!(matches!(err, ExportError::UnsafePath { .. }));
        assert!(!temp.path().join("escaped.mdc").exists());
        assert!(!project.join(".cursor").exists());
    }

    #[test]
    fn test_broken_front_matter_is_merge_error() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(RULES_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("testing.mdc"), "---\ndescription: [unclosed\n").unwrap();

        let ctx = ExportContext::new(temp.path(), &AtomicFileWriter, &[]);
        let err = CursorRules.render(&document(), &ctx).unwrap_err();
        assert!(matches!(err, ExportError::Merge { .. }));
    }
}
