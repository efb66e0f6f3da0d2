//! Selector resolution against a JSON tree.

use ruleweave_canon::normalize_heading;
use serde_json::Value;

use crate::parser::{EntityField, PathSegment, Selector};
use crate::patch::value_at;

/// Collection entity selectors search.
const SECTIONS_KEY: &str = "sections";

/// Result of resolving a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Concrete path from the tree root to the selected value
    Found(Vec<PathSegment>),
    /// Nothing (or more than one entity) matched
    NotFound { reason: String },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    fn missing(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }
}

fn entity_matches(item: &Value, field: EntityField, expected: &str) -> bool {
    match field {
        EntityField::Id | EntityField::Fingerprint => {
            item.get("fingerprint").and_then(Value::as_str) == Some(expected)
                || item.get("id").and_then(Value::as_str) == Some(expected)
        }
        EntityField::Heading => item
            .get("heading")
            .and_then(Value::as_str)
            .map_or(false, |h| normalize_heading(h) == normalize_heading(expected)),
    }
}

fn describe(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in path {
        match segment {
            PathSegment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathSegment::Index(index) => out.push_str(&format!("[{}]", index)),
        }
    }
    out
}

/// Finish a resolution by checking that the full path exists.
fn existing(tree: &Value, path: Vec<PathSegment>) -> Resolution {
    if value_at(tree, &path).is_some() {
        Resolution::Found(path)
    } else {
        Resolution::missing(format!("no value at '{}'", describe(&path)))
    }
}

/// Resolve a selector to a concrete path.
///
/// Entity selectors must match exactly one element of `sections`; an
/// ambiguous match is reported as not found rather than guessed.
pub fn resolve(tree: &Value, selector: &Selector) -> Resolution {
    match selector {
        Selector::Entity {
            kind,
            field,
            value,
            path,
        } => {
            let Some(items) = tree.get(SECTIONS_KEY).and_then(Value::as_array) else {
                return Resolution::missing("document has no sections");
            };
            let matches: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, item)| entity_matches(item, *field, value))
                .map(|(i, _)| i)
                .collect();

            match matches.as_slice() {
                [] => Resolution::missing(format!("no {} with {} '{}'", kind, field, value)),
                [index] => {
                    let mut full = vec![
                        PathSegment::Key(SECTIONS_KEY.to_string()),
                        PathSegment::Index(*index),
                    ];
                    full.extend(path.iter().cloned());
                    existing(tree, full)
                }
                many => Resolution::missing(format!(
                    "{} {}s match {} '{}'",
                    many.len(),
                    kind,
                    field,
                    value
                )),
            }
        }
        Selector::Index {
            collection,
            index,
            path,
        } => {
            let mut full = vec![
                PathSegment::Key(collection.clone()),
                PathSegment::Index(*index),
            ];
            full.extend(path.iter().cloned());
            existing(tree, full)
        }
        Selector::Path(path) => existing(tree, path.clone()),
    }
}
