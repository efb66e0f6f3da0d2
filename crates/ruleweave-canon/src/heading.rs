//! Heading normalization, fingerprints and content hashes
//!
//! Normalization drives section identity, so it must only erase
//! differences that carry no meaning: case, surrounding whitespace,
//! punctuation, separator style. Symbols that change meaning in
//! technical headings (`+`, `#`) are spelled out instead of dropped, so
//! "C", "C++" and "C#" stay distinct.

use crate::canonical::hash_bytes;

/// Longest fingerprint derived from a heading.
const MAX_FINGERPRINT_LEN: usize = 64;

/// Normalize a heading for matching.
///
/// Lower-cases, trims, strips punctuation and collapses runs of
/// whitespace and separators (`-`, `_`, `/`) into one space.
pub fn normalize_heading(heading: &str) -> String {
    let mut out = String::with_capacity(heading.len());
    let mut pending_space = false;

    for ch in heading.trim().chars() {
        if ch.is_whitespace() || matches!(ch, '-' | '_' | '/' | '\\') {
            pending_space = !out.is_empty();
            continue;
        }

        let spelled = match ch {
            '+' => Some("plus"),
            '#' => Some("sharp"),
            _ => None,
        };

        if spelled.is_none() && !ch.is_alphanumeric() {
            continue;
        }

        if pending_space {
            out.push(' ');
            pending_space = false;
        }

        match spelled {
            Some(word) => out.push_str(word),
            None => out.extend(ch.to_lowercase()),
        }
    }

    out
}

/// Derive a stable fingerprint from heading text.
///
/// ASCII slug of the normalized heading. When characters outside ASCII
/// had to be dropped, an 8 hex digest of the normalized heading is
/// appended so "Testing (α)" and "Testing (β)" stay distinct. Headings
/// with no ASCII letters or digits become `section-<8 hex>`.
pub fn fingerprint_from_heading(heading: &str) -> String {
    let normalized = normalize_heading(heading);

    let mut slug = String::with_capacity(normalized.len());
    let mut dropped = false;
    for ch in normalized.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if ch == ' ' {
            if !slug.ends_with('-') && !slug.is_empty() {
                slug.push('-');
            }
        } else {
            dropped = true;
        }
    }
    let mut slug = slug.trim_end_matches('-').to_string();
    let digest = || hash_bytes(normalized.as_bytes())[..8].to_string();

    if slug.is_empty() {
        return format!("section-{}", digest());
    }

    // room for "-" plus the digest
    let limit = if dropped { MAX_FINGERPRINT_LEN - 9 } else { MAX_FINGERPRINT_LEN };
    if slug.len() > limit {
        slug.truncate(limit);
        slug = slug.trim_end_matches('-').to_string();
    }
    if dropped {
        slug = format!("{}-{}", slug, digest());
    }
    slug
}

/// Whether `fingerprint` is usable as a section identity and file stem.
///
/// Lowercase ASCII letters and digits, then letters, digits, `.`, `_`
/// or `-`; never `..`.
pub fn is_valid_fingerprint(fingerprint: &str) -> bool {
    let mut chars = fingerprint.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit());
    first_ok
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        && !fingerprint.contains("..")
}

/// Normalize section content before hashing or comparison.
///
/// CRLF becomes LF, trailing whitespace is dropped from every line and
/// leading/trailing blank lines are removed.
pub fn normalize_content(content: &str) -> String {
    let unified = content.replace("\r\n", "\n");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map(|i| i + 1)
        .unwrap_or(start);

    lines[start..end].join("\n")
}

/// SHA-256 of normalized section content.
pub fn content_hash(content: &str) -> String {
    hash_bytes(normalize_content(content).as_bytes())
}
