//! VS Code MCP configuration (`.vscode/mcp.json`)
//!
//! Rules live under a single `ruleweave` key; every other key in the file
//! belongs to the user and is preserved.

use std::path::{Path, PathBuf};

use ruleweave_canon::{RuleDocument, RuleSection};
use serde_json::{json, Map, Value};

use super::vendor_error;
use crate::export::{ExportContext, ExportError, Rendered, RenderedFile, Transformer};
use crate::matcher::match_sections;

const NAME: &str = "vscode-mcp";
const VENDOR_KEY: &str = "vscode";
const CONFIG_PATH: &str = ".vscode/mcp.json";
const RULES_KEY: &str = "ruleweave";
const GENERATED_NOTE: &str = "generated by ruleweave sync; edits to this key are overwritten";

/// Vendor bag keys: `exclude` (bool) leaves the section out of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct McpConfig;

impl McpConfig {
    fn included(&self, document: &RuleDocument) -> Result<Vec<RuleSection>, ExportError> {
        let mut included = Vec::new();
        for section in &document.sections {
            let exclude = section.vendor.get(VENDOR_KEY).and_then(|bag| bag.get("exclude"));
            match exclude {
                None | Some(Value::Bool(false)) => included.push(section.clone()),
                Some(Value::Bool(true)) => {}
                Some(_) => return Err(vendor_error(NAME, section, "'exclude' must be a boolean")),
            }
        }
        Ok(included)
    }
}

impl Transformer for McpConfig {
    fn name(&self) -> &'static str {
        NAME
    }

    fn vendor_key(&self) -> &'static str {
        VENDOR_KEY
    }

    fn render(&self, document: &RuleDocument, ctx: &ExportContext<'_>) -> Result<Rendered, ExportError> {
        let included = self.included(document)?;
        let path = PathBuf::from(CONFIG_PATH);
        let mut root = match ctx.read(&path)? {
            Some(text) if !text.trim().is_empty() => parse_existing(&path, &text)?,
            _ => Map::new(),
        };

        let previous: Vec<RuleSection> = root
            .get(RULES_KEY)
            .and_then(|v| v.get("sections"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let outcome = match_sections(&included, &previous, ctx.managed_sections);

        let sections = serde_json::to_value(&included)
            .map_err(|e| merge_error(&path, e.to_string()))?;
        root.insert(
            RULES_KEY.to_string(),
            json!({
                "$comment": GENERATED_NOTE,
                "document": { "id": document.id, "version": document.version },
                "sections": sections,
            }),
        );

        let mut contents = serde_json::to_string_pretty(&Value::Object(root))
            .map_err(|e| merge_error(&path, e.to_string()))?;
        contents.push('\n');

        Ok(Rendered {
            files: vec![RenderedFile { path, contents }],
            stale_files: Vec::new(),
            match_stats: outcome.stats,
            fidelity_notes: Vec::new(),
        })
    }
}

fn parse_existing(path: &Path, text: &str) -> Result<Map<String, Value>, ExportError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(merge_error(path, "top level is not an object".to_string())),
        Err(e) => Err(merge_error(path, e.to_string())),
    }
}

fn merge_error(path: &Path, message: String) -> ExportError {
    ExportError::Merge {
        format: NAME.to_string(),
        path: path.to_path_buf(),
        message,
    }
}
