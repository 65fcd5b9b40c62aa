use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use super::model::Rule;
use crate::model::Stay;

pub fn is_applicable_on(rule: &Rule, date: NaiveDate) -> bool {
    rule.applicability.matches(date)
}

pub fn meets_condition(rule: &Rule, stay: &Stay, now: DateTime<Utc>) -> bool {
    rule.condition.is_met(stay, now)
}

/// Per-night expansion of a stay against the active rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightlyRules {
    pub stay: Stay,
    pub total_nights: u32,
    pub by_night: BTreeMap<NaiveDate, Vec<Rule>>,
}

/// For every night in `[check_in, check_out)`, the activated rules that apply,
/// ascending by id. Each night gets a key even when its list is empty.
///
/// Conditions only look at the whole stay, so they are decided once up front:
/// a rule that fails its condition is absent from every night.
pub fn applicable_rules_by_night<'a>(
    stay: &Stay,
    rules: impl IntoIterator<Item = &'a Rule>,
    now: DateTime<Utc>,
) -> NightlyRules {
    let mut qualifying: Vec<&Rule> = rules
        .into_iter()
        .filter(|r| r.activated && meets_condition(r, stay, now))
        .collect();
    qualifying.sort_by_key(|r| r.id);

    let by_night = stay
        .night_dates()
        .map(|night| {
            let applicable = qualifying
                .iter()
                .filter(|r| is_applicable_on(r, night))
                .map(|r| (*r).clone())
                .collect();
            (night, applicable)
        })
        .collect();

    NightlyRules {
        stay: *stay,
        total_nights: stay.nights(),
        by_night,
    }
}
