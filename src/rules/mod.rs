//! Pricing rules ("filters"): the rule model, its structural validation and
//! the per-night evaluation of a stay against the active rule set.

mod evaluate;
mod model;
mod validate;

pub use evaluate::{NightlyRules, applicable_rules_by_night, is_applicable_on, meets_condition};
pub use model::{Applicability, Condition, ConditionType, DateType, DateWindow, Rule, RuleId, WeekdaySet};
pub use validate::{FilterDraft, RuleViolation, parse_week_days};
