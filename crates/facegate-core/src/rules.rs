//! Access-rule evaluation.
//!
//! A user may enter a zone when at least one of their active rules for that
//! zone applies today and its window covers the current time.

use crate::schedule::{weekday_index, TimeOfDay};
use crate::types::AccessRule;
use chrono::{Datelike, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// A rule covers the current time.
    Allowed { rule_id: i64 },
    /// The user has no active rule for this zone today.
    NoRule,
    /// Rules exist today but none covers the current time.
    OutsideWindow { start: TimeOfDay, end: TimeOfDay },
}

impl AccessRule {
    /// Whether the rule is active and scheduled for the given day index.
    pub fn applies_on(&self, day: u8) -> bool {
        self.active && self.weekday.map_or(true, |d| d == day)
    }
}

/// Evaluate `rules` for `user_id` entering `zone_id` at local time `now`.
pub fn evaluate(rules: &[AccessRule], user_id: i64, zone_id: i64, now: NaiveDateTime) -> RuleOutcome {
    let today = weekday_index(now.weekday());
    let mut applicable: Vec<&AccessRule> = rules
        .iter()
        .filter(|r| r.user_id == user_id && r.zone_id == zone_id && r.applies_on(today))
        .collect();

    // Day-specific rules take precedence when reporting the expected window.
    applicable.sort_by_key(|r| (r.weekday.is_none(), r.id));

    let Some(first) = applicable.first() else {
        return RuleOutcome::NoRule;
    };

    let time = now.time();
    match applicable
        .iter()
        .find(|r| TimeOfDay::window_contains(r.start, r.end, time))
    {
        Some(rule) => RuleOutcome::Allowed { rule_id: rule.id },
        None => RuleOutcome::OutsideWindow {
            start: first.start,
            end: first.end,
        },
    }
}
