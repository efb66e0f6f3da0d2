//! Single-file markdown targets (AGENTS.md, CLAUDE.md)

use std::path::PathBuf;

use ruleweave_canon::{RuleDocument, RuleSection};
use serde_json::Value;

use super::{merge_markdown, vendor_error};
use crate::export::{
    lossy_fields, ExportContext, ExportError, FidelityKind, FidelityNote, Rendered, RenderedFile,
    Transformer,
};

/// All sections in one markdown file.
///
/// Vendor bag keys: `exclude` (bool) leaves a section out of this file.
#[derive(Debug, Clone)]
pub struct AggregatedMarkdown {
    name: &'static str,
    vendor_key: &'static str,
    file: &'static str,
    title: &'static str,
}

impl AggregatedMarkdown {
    pub fn agents() -> Self {
        Self {
            name: "agents-md",
            vendor_key: "agents",
            file: "AGENTS.md",
            title: "# Agent Instructions",
        }
    }

    pub fn claude() -> Self {
        Self {
            name: "claude-md",
            vendor_key: "claude",
            file: "CLAUDE.md",
            title: "# Claude Instructions",
        }
    }

    fn excluded(&self, section: &RuleSection) -> Result<bool, ExportError> {
        let Some(bag) = section.vendor.get(self.vendor_key) else {
            return Ok(false);
        };
        match bag.get("exclude") {
            None => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(_) => Err(vendor_error(self.name, section, "'exclude' must be a boolean")),
        }
    }
}

impl Transformer for AggregatedMarkdown {
    fn name(&self) -> &'static str {
        self.name
    }

    fn vendor_key(&self) -> &'static str {
        self.vendor_key
    }

    fn render(&self, document: &RuleDocument, ctx: &ExportContext<'_>) -> Result<Rendered, ExportError> {
        let mut included = Vec::new();
        let mut notes = Vec::new();

        for section in &document.sections {
            if self.excluded(section)? {
                continue;
            }
            notes.extend(lossy_fields(self.name, self.vendor_key, section));
            if let Some(bag) = section.vendor.get(self.vendor_key) {
                for key in bag.keys().filter(|k| k.as_str() != "exclude") {
                    notes.push(FidelityNote {
                        format: self.name.to_string(),
                        fingerprint: section.fingerprint.clone(),
                        kind: FidelityKind::UnsupportedField,
                        message: format!("unknown {} vendor key '{}'", self.vendor_key, key),
                    });
                }
            }
            included.push(section.clone());
        }

        let path = PathBuf::from(self.file);
        let existing = ctx.read(&path)?;
        let (contents, outcome) =
            merge_markdown(existing.as_deref(), &included, self.title, ctx.managed_sections);

        Ok(Rendered {
            files: vec![RenderedFile { path, contents }],
            stale_files: Vec::new(),
            match_stats: outcome.stats,
            fidelity_notes: notes,
        })
    }
}
