//! Overlays
//!
//! Selector-addressed patches applied over the merged document tree.
//! Application is pure: the input tree is never touched, and an overlay
//! whose selector no longer matches is reported stale instead of failing.
//! Applied to a typed document, an overlay that would make the document
//! invalid is skipped and reported as rejected.

use std::collections::BTreeMap;

use ruleweave_canon::RuleDocument;
use ruleweave_selector::{
    parse_selector, remove_dotted, resolve, set_dotted, value_at_mut, PathSegment, Resolution,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// One configured patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub selector: String,

    /// Keys to assign; dotted keys create intermediate objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<BTreeMap<String, Value>>,

    /// Keys to delete; missing keys are ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<Vec<String>>,
}

impl Overlay {
    pub fn set(selector: impl Into<String>, key: &str, value: Value) -> Self {
        let mut set = BTreeMap::new();
        set.insert(key.to_string(), value);
        Self {
            selector: selector.into(),
            set: Some(set),
            remove: None,
        }
    }

    pub fn remove(selector: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            selector: selector.into(),
            set: None,
            remove: Some(keys.iter().map(|k| k.to_string()).collect()),
        }
    }

    fn has_changes(&self) -> bool {
        self.set.as_ref().is_some_and(|s| !s.is_empty())
            || self.remove.as_ref().is_some_and(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayStatus {
    Healthy,
    Stale,
    /// Matched, but the patched document failed validation
    Rejected,
}

impl OverlayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayStatus::Healthy => "healthy",
            OverlayStatus::Stale => "stale",
            OverlayStatus::Rejected => "rejected",
        }
    }
}

/// Health of one overlay against a specific tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayHealth {
    pub selector: String,
    pub status: OverlayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OverlayHealth {
    fn healthy(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            status: OverlayStatus::Healthy,
            reason: None,
        }
    }

    fn stale(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            status: OverlayStatus::Stale,
            reason: Some(reason.into()),
        }
    }

    fn rejected(selector: &str, reason: impl Into<String>) -> Self {
        Self {
            selector: selector.to_string(),
            status: OverlayStatus::Rejected,
            reason: Some(reason.into()),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.status == OverlayStatus::Stale
    }

    pub fn is_healthy(&self) -> bool {
        self.status == OverlayStatus::Healthy
    }

    fn log(&self) {
        if !self.is_healthy() {
            log::warn!(
                "overlay '{}' is {}: {}",
                self.selector,
                self.status.as_str(),
                self.reason.as_deref().unwrap_or("unknown")
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayApplication {
    pub tree: Value,
    pub applied: usize,
    pub stale: usize,
    pub rejected: usize,
    /// One entry per overlay, in input order
    pub health: Vec<OverlayHealth>,
}

/// Apply overlays in order to a copy of `tree`.
pub fn apply_overlays(tree: &Value, overlays: &[Overlay]) -> OverlayApplication {
    let mut working = tree.clone();
    let mut health = Vec::with_capacity(overlays.len());

    for overlay in overlays {
        let result = apply_one(&mut working, overlay);
        result.log();
        health.push(result);
    }
    summarize(working, health)
}

fn summarize(tree: Value, health: Vec<OverlayHealth>) -> OverlayApplication {
    let count = |status: OverlayStatus| health.iter().filter(|h| h.status == status).count();
    let (applied, stale, rejected) = (
        count(OverlayStatus::Healthy),
        count(OverlayStatus::Stale),
        count(OverlayStatus::Rejected),
    );
    OverlayApplication {
        tree,
        applied,
        stale,
        rejected,
        health,
    }
}

/// Report which overlays still match `tree`, without keeping the result.
pub fn overlay_status(tree: &Value, overlays: &[Overlay]) -> Vec<OverlayHealth> {
    apply_overlays(tree, overlays).health
}

/// Apply overlays to a typed document and read it back.
///
/// Each overlay is checked against the document model as it is applied;
/// one that would leave an invalid document is rejected and skipped.
pub fn apply_to_document(
    document: &RuleDocument,
    overlays: &[Overlay],
) -> Result<(RuleDocument, OverlayApplication), SyncError> {
    if overlays.is_empty() {
        return Ok((document.clone(), summarize(Value::Null, Vec::new())));
    }

    let mut working = document.to_value()?;
    let mut health = Vec::with_capacity(overlays.len());
    for overlay in overlays {
        let mut candidate = working.clone();
        let mut result = apply_one(&mut candidate, overlay);
        if result.is_healthy() {
            match check_document(&candidate) {
                Ok(()) => working = candidate,
                Err(reason) => result = OverlayHealth::rejected(&overlay.selector, reason),
            }
        }
        result.log();
        health.push(result);
    }

    let patched = RuleDocument::from_value(working.clone())?;
    Ok((patched, summarize(working, health)))
}

fn check_document(tree: &Value) -> Result<(), String> {
    let document = RuleDocument::from_value(tree.clone()).map_err(|e| e.to_string())?;
    document.validate().map_err(|e| match e.issues() {
        [] => e.to_string(),
        issues => issues.join("; "),
    })
}

fn apply_one(tree: &mut Value, overlay: &Overlay) -> OverlayHealth {
    let selector = match parse_selector(&overlay.selector) {
        Ok(selector) => selector,
        Err(e) => return OverlayHealth::stale(&overlay.selector, e.to_string()),
    };

    let path: Vec<PathSegment> = match resolve(tree, &selector) {
        Resolution::Found(path) => path,
        Resolution::NotFound { reason } => return OverlayHealth::stale(&overlay.selector, reason),
    };

    if !overlay.has_changes() {
        return OverlayHealth::healthy(&overlay.selector);
    }

    let Some(target) = value_at_mut(tree, &path) else {
        return OverlayHealth::stale(&overlay.selector, "selected value disappeared");
    };
    if !target.is_object() {
        return OverlayHealth::stale(&overlay.selector, "selected value is not an object");
    }

    // Patch a copy so a failing key leaves the target untouched
    let mut patched = target.clone();
    if let Some(set) = &overlay.set {
        for (key, value) in set {
            if let Err(e) = set_dotted(&mut patched, key, value.clone()) {
                return OverlayHealth::stale(&overlay.selector, e.to_string());
            }
        }
    }
    if let Some(remove) = &overlay.remove {
        for key in remove {
            remove_dotted(&mut patched, key);
        }
    }
    *target = patched;

    OverlayHealth::healthy(&overlay.selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleweave_canon::RuleSection;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "id": "rules",
            "sections": [
                {"heading": "Testing", "fingerprint": "testing-001", "level": 2, "content": "Run tests."},
                {"heading": "Style", "fingerprint": "style", "level": 2, "content": "Use rustfmt.",
                 "vendor": {"cursor": {"globs": ["**/*.rs"], "alwaysApply": true}}}
            ]
        })
    }

    #[test]
    fn test_set_creates_intermediates() {
        let overlays = vec![Overlay::set(
            "rule[id=testing-001]",
            "vendor.cursor.alwaysApply",
            json!(false),
        )];
        let result = apply_overlays(&tree(), &overlays);

        assert_eq!(result.applied, 1);
        assert_eq!(
            result.tree["sections"][0]["vendor"]["cursor"]["alwaysApply"],
            json!(false)
        );
    }

    #[test]
    fn test_input_not_mutated_and_idempotent() {
        let original = tree();
        let overlays = vec![
            Overlay::set("section[heading=style]", "scope", json!("team")),
            Overlay::remove("section[fingerprint=style]", &["vendor.cursor.alwaysApply", "missing.key"]),
        ];
        let once = apply_overlays(&original, &overlays);
        let twice = apply_overlays(&once.tree, &overlays);

        assert_eq!(original, tree());
        assert_eq!(once.tree, twice.tree);
        assert_eq!(once.tree["sections"][1]["scope"], "team");
        assert!(once.tree["sections"][1]["vendor"]["cursor"].get("alwaysApply").is_none());
    }

    #[test]
    fn test_stale_overlay_leaves_tree_unchanged() {
        let overlays = vec![Overlay::set("rule[id=gone]", "content", json!("x"))];
        let result = apply_overlays(&tree(), &overlays);

        assert_eq!(result.tree, tree());
        assert_eq!(result.stale, 1);
        assert_eq!(result.health[0].status, OverlayStatus::Stale);
        assert!(result.health[0].reason.as_deref().unwrap().contains("gone"));
    }

    #[test]
    fn test_type_mismatch_is_stale_and_atomic() {
        let mut set = BTreeMap::new();
        set.insert("aaa".to_string(), json!(1));
        set.insert("content.nested".to_string(), json!(2));
        let overlays = vec![Overlay {
            selector: "rule[id=testing-001]".to_string(),
            set: Some(set),
            remove: None,
        }];
        let result = apply_overlays(&tree(), &overlays);

        assert_eq!(result.health[0].status, OverlayStatus::Stale);
        assert!(result.tree["sections"][0].get("aaa").is_none());
    }

    #[test]
    fn test_non_object_target_is_stale() {
        let overlays = vec![Overlay::set("sections[0].content", "x", json!(1))];
        let result = apply_overlays(&tree(), &overlays);
        assert_eq!(result.health[0].status, OverlayStatus::Stale);
    }

    #[test]
    fn test_invalid_selector_is_stale() {
        let health = overlay_status(&tree(), &[Overlay::set("rule[id=", "x", json!(1))]);
        assert!(health[0].is_stale());
    }

    #[test]
    fn test_health_flips_when_rule_removed() {
        let overlays = vec![Overlay::set("rule[id=testing-001]", "scope", json!("team"))];
        assert_eq!(overlay_status(&tree(), &overlays)[0].status, OverlayStatus::Healthy);

        let mut without = tree();
        without["sections"].as_array_mut().unwrap().remove(0);
        assert_eq!(overlay_status(&without, &overlays)[0].status, OverlayStatus::Stale);
    }

    #[test]
    fn test_apply_to_document_round_trip() {
        let document = RuleDocument::new(
            "rules",
            "1.0.0",
            vec![RuleSection::new("Testing", 2, "Run tests.", "testing-001")],
        );
        let overlays = vec![
            Overlay::set("rule[id=testing-001]", "vendor.cursor.globs", json!(["**/*.rs"])),
            Overlay::set("rule[id=testing-001]", "owner_note", json!("qa")),
        ];
        let (patched, application) = apply_to_document(&document, &overlays).unwrap();

        assert_eq!(application.applied, 2);
        let section = patched.section("testing-001").unwrap();
        assert_eq!(section.vendor.get("cursor").unwrap()["globs"], json!(["**/*.rs"]));
        assert_eq!(section.extra["owner_note"], "qa");
    }

    #[test]
    fn test_invalid_overlay_is_rejected_without_failing_others() {
        let document = RuleDocument::new(
            "rules",
            "1.0.0",
            vec![
                RuleSection::new("Testing", 2, "Run tests.", "testing-001"),
                RuleSection::new("Style", 2, "Use rustfmt.", "style-001"),
            ],
        );
        let overlays = vec![
            Overlay::set("rule[id=testing-001]", "level", json!(9)),
            Overlay::set("rule[id=style-001]", "vendor", json!("cursor")),
            Overlay::set("rule[id=style-001]", "owner_note", json!("dx")),
        ];
        let (patched, application) = apply_to_document(&document, &overlays).unwrap();

        assert_eq!(application.health[0].status, OverlayStatus::Rejected);
        assert_eq!(application.health[0].selector, "rule[id=testing-001]");
        assert!(application.health[0].reason.is_some());
        assert_eq!(application.health[1].status, OverlayStatus::Rejected);
        assert!(application.health[2].is_healthy());
        assert_eq!((application.applied, application.stale, application.rejected), (1, 0, 2));

        assert_eq!(patched.section("testing-001").unwrap().level, 2);
        assert_eq!(patched.section("style-001").unwrap().extra["owner_note"], "dx");
    }
}
