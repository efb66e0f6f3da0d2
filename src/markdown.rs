//! Markdown sections
//!
//! Splits markdown into sections at level 2-6 headings (fenced code
//! blocks are never split), keeping each section's raw text so user
//! sections can be written back unchanged. Also renders canonical
//! sections and assembles generated files around the ownership markers.

use std::collections::BTreeMap;

use ruleweave_canon::{fingerprint_from_heading, is_valid_fingerprint, RuleSection};
use serde_json::Value;

/// First line of every generated markdown file.
pub const GENERATED_MARKER: &str =
    "<!-- ruleweave:generated - sections above the user marker are managed, do not edit -->";

/// Everything after this line belongs to the user.
pub const USER_MARKER: &str = "<!-- ruleweave:user - sections below are preserved as written -->";

const ID_MARKER_PREFIX: &str = "<!-- ruleweave:id=";
const ID_MARKER_SUFFIX: &str = "-->";

/// A section plus the exact text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSection {
    pub section: RuleSection,
    /// Heading line through the line before the next section, verbatim
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMarkdown {
    /// Text before the first section (usually an H1 title)
    pub preamble: String,
    pub sections: Vec<ParsedSection>,
    /// Whether the file carried the generated marker
    pub generated: bool,
}

impl ParsedMarkdown {
    pub fn rule_sections(&self) -> Vec<RuleSection> {
        self.sections.iter().map(|p| p.section.clone()).collect()
    }
}

/// Parse an ATX heading line into `(level, title)`.
pub fn parse_heading(line: &str) -> Option<(u8, String)> {
    // Four spaces of indentation make a code block, not a heading
    if line.starts_with("    ") || line.starts_with('\t') {
        return None;
    }
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    // A closing run of '#' only counts after whitespace, so "C#" survives
    let mut title = rest.trim();
    let without_closing = title.trim_end_matches('#');
    if without_closing.is_empty() {
        title = "";
    } else if without_closing.ends_with(' ') || without_closing.ends_with('\t') {
        title = without_closing.trim_end();
    }
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title.to_string()))
}

fn fence_delimiter(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn is_ownership_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == GENERATED_MARKER || trimmed == USER_MARKER
}

fn parse_id_marker(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let inner = trimmed
        .strip_prefix(ID_MARKER_PREFIX)?
        .strip_suffix(ID_MARKER_SUFFIX)?
        .trim();
    if inner.is_empty() {
        return None;
    }
    if !is_valid_fingerprint(inner) {
        log::warn!("ignoring id marker '{}': not a valid fingerprint", inner);
        return None;
    }
    Some(inner.to_string())
}

/// Drop leading and trailing blank lines, keep everything else as is.
fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(start);
    lines[start..end]
        .iter()
        .map(|l| l.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n")
}

struct Pending {
    level: u8,
    heading: String,
    explicit_id: Option<String>,
    body: Vec<String>,
    raw: String,
}

impl Pending {
    fn finish(self) -> (RuleSection, String) {
        let fingerprint = self
            .explicit_id
            .unwrap_or_else(|| fingerprint_from_heading(&self.heading));
        let content = trim_blank_lines(&self.body.concat());
        (
            RuleSection::new(self.heading, self.level, content, fingerprint),
            self.raw,
        )
    }
}

/// Split markdown into sections.
///
/// Fingerprints come from an explicit `<!-- ruleweave:id=... -->` line
/// when present, otherwise from the heading. Repeated fingerprints get
/// `-2`, `-3` suffixes in document order.
pub fn parse_markdown(input: &str) -> ParsedMarkdown {
    let mut preamble = String::new();
    let mut finished: Vec<(RuleSection, String)> = Vec::new();
    let mut current: Option<Pending> = None;
    let mut generated = false;
    let mut fence: Option<&str> = None;

    for line in input.split_inclusive('\n') {
        let bare = line.trim_end_matches('\n').trim_end_matches('\r');

        if fence.is_none() && is_ownership_marker(bare) {
            if bare.trim() == GENERATED_MARKER {
                generated = true;
            }
            continue;
        }

        if let Some(open) = fence {
            if bare.trim_start().starts_with(open) {
                fence = None;
            }
        } else if let Some(delim) = fence_delimiter(bare) {
            fence = Some(delim);
        } else if let Some((level, title)) = parse_heading(bare) {
            if level >= 2 {
                if let Some(done) = current.take() {
                    finished.push(done.finish());
                }
                current = Some(Pending {
                    level,
                    heading: title,
                    explicit_id: None,
                    body: Vec::new(),
                    raw: line.to_string(),
                });
                continue;
            }
        }

        match current.as_mut() {
            Some(pending) => {
                pending.raw.push_str(line);
                if fence.is_none() && pending.explicit_id.is_none() {
                    if let Some(id) = parse_id_marker(bare) {
                        pending.explicit_id = Some(id);
                        continue;
                    }
                }
                pending.body.push(line.to_string());
            }
            None => preamble.push_str(line),
        }
    }

    if let Some(done) = current.take() {
        finished.push(done.finish());
    }

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let sections = finished
        .into_iter()
        .map(|(mut section, raw)| {
            let count = seen.entry(section.fingerprint.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                section.fingerprint = format!("{}-{}", section.fingerprint, count);
            }
            ParsedSection { section, raw }
        })
        .collect();

    ParsedMarkdown {
        preamble: trim_blank_lines(&preamble),
        sections,
        generated,
    }
}

/// Render one canonical section as markdown (no trailing blank line).
pub fn render_section(section: &RuleSection) -> String {
    let level = section.level.clamp(2, 6) as usize;
    let mut out = format!("{} {}\n", "#".repeat(level), section.heading.trim());
    if section.fingerprint != fingerprint_from_heading(&section.heading) {
        out.push_str(&format!(
            "{}{} {}\n",
            ID_MARKER_PREFIX, section.fingerprint, ID_MARKER_SUFFIX
        ));
    }
    let content = trim_blank_lines(&section.content);
    if !content.is_empty() {
        out.push('\n');
        out.push_str(&content);
        out.push('\n');
    }
    out
}

/// Assemble a generated file: marker, preamble, managed blocks, then the
/// user marker and user sections exactly as they were written.
pub fn assemble(preamble: &str, managed: &[String], user_raw: &[String]) -> String {
    let mut out = String::new();
    out.push_str(GENERATED_MARKER);
    out.push_str("\n\n");

    let preamble = trim_blank_lines(preamble);
    if !preamble.is_empty() {
        out.push_str(&preamble);
        out.push_str("\n\n");
    }

    for block in managed {
        let block = trim_blank_lines(block);
        if block.is_empty() {
            continue;
        }
        out.push_str(&block);
        out.push_str("\n\n");
    }

    if user_raw.is_empty() {
        let trimmed_len = out.trim_end_matches('\n').len();
        out.truncate(trimmed_len);
        out.push('\n');
        return out;
    }

    // User text is written back verbatim, trailing blank lines included
    out.push_str(USER_MARKER);
    out.push_str("\n\n");
    for (i, raw) in user_raw.iter().enumerate() {
        out.push_str(raw);
        if i + 1 < user_raw.len() && !raw.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Split YAML front matter from a document body.
///
/// Returns an empty map when the input has no front matter.
pub fn split_front_matter(input: &str) -> Result<(serde_json::Map<String, Value>, String), String> {
    let stripped = input.trim_start_matches('\u{feff}');
    let mut lines = stripped.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Ok((serde_json::Map::new(), stripped.to_string())),
    }

    let mut yaml = String::new();
    let mut closed = false;
    for line in lines.by_ref() {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }
    if !closed {
        return Err("front matter is not terminated by '---'".to_string());
    }
    let body: String = lines.collect();

    if yaml.trim().is_empty() {
        return Ok((serde_json::Map::new(), body));
    }

    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&yaml).map_err(|e| format!("invalid front matter: {}", e))?;
    let json_value: Value =
        serde_json::to_value(yaml_value).map_err(|e| format!("invalid front matter: {}", e))?;

    match json_value {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((serde_json::Map::new(), body)),
        _ => Err("front matter must be a mapping".to_string()),
    }
}

/// Render a YAML front matter block (including both delimiters).
pub fn render_front_matter(fields: &serde_json::Map<String, Value>) -> Result<String, String> {
    if fields.is_empty() {
        return Ok(String::new());
    }
    let yaml = serde_yaml::to_string(fields).map_err(|e| e.to_string())?;
    Ok(format!("---\n{}---\n", yaml))
}
