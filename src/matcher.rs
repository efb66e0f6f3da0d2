//! Section matching
//!
//! Classifies the sections of an existing target file against the
//! canonical sections. Canonical content always wins; sections with no
//! canonical counterpart belong to the user and are left alone.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ruleweave_canon::{normalize_heading, RuleSection};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchAction {
    /// Existing section already matches canonical content
    Keep,
    /// Existing section differs and will be replaced
    Update,
    /// Canonical section missing from the target
    Add,
    /// Section only present in the target
    UserAdded,
}

impl MatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAction::Keep => "keep",
            MatchAction::Update => "update",
            MatchAction::Add => "add",
            MatchAction::UserAdded => "user-added",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub action: MatchAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ir_section: Option<RuleSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_section: Option<RuleSection>,

    /// Position of `existing_section` in the input slice
    #[serde(skip)]
    pub existing_index: Option<usize>,

    /// Heading is listed in the managed-sections configuration
    pub is_team_managed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub keep: usize,
    pub update: usize,
    pub add: usize,
    pub user_added: usize,
    /// Team-managed sections whose local edits would be overwritten
    pub managed_updates: usize,
}

impl MatchStats {
    fn record(&mut self, result: &MatchResult) {
        match result.action {
            MatchAction::Keep => self.keep += 1,
            MatchAction::Update => {
                self.update += 1;
                if result.is_team_managed {
                    self.managed_updates += 1;
                }
            }
            MatchAction::Add => self.add += 1,
            MatchAction::UserAdded => self.user_added += 1,
        }
    }

    /// Whether applying the match would change the target.
    pub fn has_changes(&self) -> bool {
        self.update > 0 || self.add > 0
    }

    pub fn absorb(&mut self, other: &MatchStats) {
        self.keep += other.keep;
        self.update += other.update;
        self.add += other.add;
        self.user_added += other.user_added;
        self.managed_updates += other.managed_updates;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub stats: MatchStats,
}

impl MatchOutcome {
    /// Reclassify a kept result as an update (for example when only the
    /// heading text or level changed).
    pub fn mark_updated(&mut self, index: usize) {
        let Some(result) = self.results.get_mut(index) else {
            return;
        };
        if result.action != MatchAction::Keep {
            return;
        }
        result.action = MatchAction::Update;
        self.stats.keep -= 1;
        self.stats.update += 1;
        if result.is_team_managed {
            self.stats.managed_updates += 1;
        }
    }
}

/// Match canonical sections against the sections of an existing file.
///
/// Sections pair up by normalized heading. When a heading repeats, the
/// n-th canonical occurrence pairs with the n-th existing one. Results
/// list canonical sections in canonical order, followed by user-added
/// sections in file order.
pub fn match_sections(
    ir: &[RuleSection],
    existing: &[RuleSection],
    managed: &[String],
) -> MatchOutcome {
    let managed: BTreeSet<String> = managed.iter().map(|h| normalize_heading(h)).collect();

    let mut by_heading: BTreeMap<String, VecDeque<usize>> = BTreeMap::new();
    for (index, section) in existing.iter().enumerate() {
        by_heading
            .entry(normalize_heading(&section.heading))
            .or_default()
            .push_back(index);
    }

    let mut claimed = vec![false; existing.len()];
    let mut outcome = MatchOutcome::default();

    for section in ir {
        let key = normalize_heading(&section.heading);
        let is_team_managed = managed.contains(&key);

        let counterpart = by_heading.get_mut(&key).and_then(|queue| queue.pop_front());
        let result = match counterpart {
            Some(index) => {
                claimed[index] = true;
                let current = &existing[index];
                let action = if current.content_hash() == section.content_hash() {
                    MatchAction::Keep
                } else {
                    MatchAction::Update
                };
                MatchResult {
                    action,
                    ir_section: Some(section.clone()),
                    existing_section: Some(current.clone()),
                    existing_index: Some(index),
                    is_team_managed,
                }
            }
            None => MatchResult {
                action: MatchAction::Add,
                ir_section: Some(section.clone()),
                existing_section: None,
                existing_index: None,
                is_team_managed,
            },
        };

        outcome.stats.record(&result);
        outcome.results.push(result);
    }

    for (index, section) in existing.iter().enumerate() {
        if claimed[index] {
            continue;
        }
        let result = MatchResult {
            action: MatchAction::UserAdded,
            ir_section: None,
            existing_section: Some(section.clone()),
            existing_index: Some(index),
            is_team_managed: managed.contains(&normalize_heading(&section.heading)),
        };
        outcome.stats.record(&result);
        outcome.results.push(result);
    }

    if outcome.stats.managed_updates > 0 {
        log::warn!(
            "{} team-managed section(s) were edited locally and will be replaced",
            outcome.stats.managed_updates
        );
    }

    outcome
}
