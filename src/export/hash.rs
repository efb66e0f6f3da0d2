//! Export content hashes
//!
//! `sha256(JCS({format, sections}))` with sections sorted by fingerprint,
//! so the hash depends on what is exported, never on rendering order.

use ruleweave_canon::{hash_serializable, CanonicalizationError, RuleSection};
use serde::Serialize;

#[derive(Serialize)]
struct HashInput<'a> {
    format: &'a str,
    sections: Vec<&'a RuleSection>,
}

pub fn content_hash(format: &str, sections: &[RuleSection]) -> Result<String, CanonicalizationError> {
    let mut sorted: Vec<&RuleSection> = sections.iter().collect();
    sorted.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    hash_serializable(&HashInput {
        format,
        sections: sorted,
    })
}
