//! Built-in target formats

mod aggregated;
mod cursor;
mod mcp;
mod rules_index;

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use ruleweave_canon::{is_valid_fingerprint, RuleSection};

use super::{ExportContext, ExportError, Transformer};
use crate::markdown::{assemble, parse_markdown, render_section, GENERATED_MARKER, USER_MARKER};
use crate::matcher::{match_sections, MatchAction, MatchOutcome};

pub use aggregated::AggregatedMarkdown;
pub use cursor::CursorRules;
pub use mcp::McpConfig;
pub use rules_index::RulesIndex;

/// Every format name accepted in `exporters`
pub const KNOWN_FORMATS: &[&str] = &["agents-md", "claude-md", "cursor", "rules-index", "vscode-mcp"];

pub fn transformer_for(name: &str) -> Option<Box<dyn Transformer>> {
    match name {
        "agents-md" => Some(Box::new(AggregatedMarkdown::agents())),
        "claude-md" => Some(Box::new(AggregatedMarkdown::claude())),
        "cursor" => Some(Box::new(CursorRules)),
        "rules-index" => Some(Box::new(RulesIndex)),
        "vscode-mcp" => Some(Box::new(McpConfig)),
        _ => None,
    }
}

/// Merge canonical sections into an existing markdown body.
///
/// Kept sections reuse their existing text, updated and added sections
/// are rendered fresh, and user sections move below the user marker
/// unchanged. A kept section whose heading, level or id differs from
/// the canonical one is rendered fresh and counted as an update. The
/// existing preamble wins over `default_preamble`.
pub(crate) fn merge_markdown(
    existing: Option<&str>,
    sections: &[RuleSection],
    default_preamble: &str,
    managed: &[String],
) -> (String, MatchOutcome) {
    let parsed = parse_markdown(existing.unwrap_or_default());
    let current = parsed.rule_sections();
    let mut outcome = match_sections(sections, &current, managed);

    let stale_headers: Vec<usize> = outcome
        .results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.action == MatchAction::Keep)
        .filter(|(_, r)| match (&r.ir_section, &r.existing_section) {
            (Some(canonical), Some(on_disk)) => !same_header(canonical, on_disk),
            _ => false,
        })
        .map(|(i, _)| i)
        .collect();
    for index in stale_headers {
        outcome.mark_updated(index);
    }

    let mut blocks = Vec::new();
    let mut user_raw = Vec::new();
    for result in &outcome.results {
        let existing_raw = result
            .existing_index
            .and_then(|i| parsed.sections.get(i))
            .map(|p| p.raw.clone());
        match (result.action, &result.ir_section) {
            (MatchAction::Keep, _) => blocks.extend(existing_raw),
            (MatchAction::Update | MatchAction::Add, Some(section)) => {
                blocks.push(render_section(section))
            }
            (MatchAction::UserAdded, _) => user_raw.extend(existing_raw),
            _ => {}
        }
    }

    let preamble = if parsed.preamble.is_empty() {
        default_preamble
    } else {
        parsed.preamble.as_str()
    };
    (assemble(preamble, &blocks, &user_raw), outcome)
}

fn same_header(canonical: &RuleSection, on_disk: &RuleSection) -> bool {
    canonical.level == on_disk.level
        && canonical.heading.trim() == on_disk.heading
        && canonical.fingerprint == on_disk.fingerprint
}

/// Previously generated files in `dir` that are not in `keep`.
///
/// Files without the generated marker belong to someone else and are
/// never returned; generated files that gained user sections are kept.
pub(crate) fn stale_generated(
    ctx: &ExportContext<'_>,
    dir: &Path,
    extension: &str,
    keep: &BTreeSet<PathBuf>,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut stale = Vec::new();
    for path in ctx.list(dir)? {
        if keep.contains(&path) || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(contents) = ctx.read(&path)? else {
            continue;
        };
        let generated = contents.lines().any(|l| l.trim() == GENERATED_MARKER);
        if !generated {
            continue;
        }
        if contents.lines().any(|l| l.trim() == USER_MARKER) {
            log::warn!(
                "{} has no canonical rule left but holds user sections; leaving it",
                path.display()
            );
            continue;
        }
        stale.push(path);
    }
    Ok(stale)
}

/// `<dir>/<fingerprint>.<extension>`, refused unless it stays inside `dir`.
pub(crate) fn section_file(
    format: &str,
    dir: &str,
    section: &RuleSection,
    extension: &str,
) -> Result<PathBuf, ExportError> {
    let file_name = format!("{}.{}", section.fingerprint, extension);
    let single_component = Path::new(&file_name)
        .components()
        .map(|c| matches!(c, Component::Normal(_)))
        .eq([true]);
    if !is_valid_fingerprint(&section.fingerprint) || !single_component {
        return Err(ExportError::UnsafePath {
            format: format.to_string(),
            fingerprint: section.fingerprint.clone(),
            dir: dir.to_string(),
        });
    }
    Ok(Path::new(dir).join(file_name))
}

/// Fail with a vendor error for `section`.
pub(crate) fn vendor_error(format: &str, section: &RuleSection, message: impl Into<String>) -> ExportError {
    ExportError::Vendor {
        format: format.to_string(),
        fingerprint: section.fingerprint.clone(),
        message: message.into(),
    }
}
