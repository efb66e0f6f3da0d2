//! Per-section rule files plus a `RULES.md` table of contents

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ruleweave_canon::{RuleDocument, RuleSection};
use serde_json::Value;

use super::{merge_markdown, section_file, stale_generated, vendor_error};
use crate::export::{lossy_fields, ExportContext, ExportError, Rendered, RenderedFile, Transformer};
use crate::markdown::GENERATED_MARKER;

const NAME: &str = "rules-index";
const VENDOR_KEY: &str = "index";
pub(crate) const INDEX_DIR: &str = ".ruleweave/index";
pub(crate) const INDEX_FILE: &str = "RULES.md";

/// Vendor bag keys: `summary` (string) is shown next to the link.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesIndex;

impl RulesIndex {
    fn summary<'s>(&self, section: &'s RuleSection) -> Result<Option<&'s str>, ExportError> {
        match section.vendor.get(VENDOR_KEY).and_then(|bag| bag.get("summary")) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(vendor_error(NAME, section, "'summary' must be a string")),
        }
    }
}

impl Transformer for RulesIndex {
    fn name(&self) -> &'static str {
        NAME
    }

    fn vendor_key(&self) -> &'static str {
        VENDOR_KEY
    }

    fn render(&self, document: &RuleDocument, ctx: &ExportContext<'_>) -> Result<Rendered, ExportError> {
        let mut rendered = Rendered::default();
        let mut keep = BTreeSet::new();
        let mut toc = format!("{}\n\n# Rules\n\n", GENERATED_MARKER);

        for section in &document.sections {
            let summary = self.summary(section)?;
            rendered
                .fidelity_notes
                .extend(lossy_fields(NAME, VENDOR_KEY, section));

            let path = section_file(NAME, INDEX_DIR, section, "md")?;
            let existing = ctx.read(&path)?;
            let (contents, outcome) = merge_markdown(
                existing.as_deref(),
                std::slice::from_ref(section),
                "",
                ctx.managed_sections,
            );
            rendered.match_stats.absorb(&outcome.stats);

            toc.push_str(&toc_line(section, &path, summary));
            keep.insert(path.clone());
            rendered.files.push(RenderedFile { path, contents });
        }

        rendered.files.push(RenderedFile {
            path: PathBuf::from(INDEX_FILE),
            contents: format!("{}\n", toc.trim_end()),
        });
        rendered.stale_files = stale_generated(ctx, Path::new(INDEX_DIR), "md", &keep)?;
        Ok(rendered)
    }
}

fn toc_line(section: &RuleSection, path: &Path, summary: Option<&str>) -> String {
    let title = section.heading.replace('[', "\\[").replace(']', "\\]");
    let mut line = format!("- [{}]({})", title, path.display());
    if let Some(scope) = section.scope {
        line.push_str(&format!(" ({})", scope));
    }
    if let Some(summary) = summary {
        line.push_str(" - ");
        line.push_str(summary.trim());
    }
    line.push('\n');
    line
}
