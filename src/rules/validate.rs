use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use super::model::*;

/// Rejection reason for a filter payload. The message is shown to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RuleViolation(pub String);

fn violation(msg: impl Into<String>) -> RuleViolation {
    RuleViolation(msg.into())
}

/// Flat create/update payload as clients send it. Every field is optional here;
/// [`FilterDraft::into_rule`] decides which ones the chosen kinds require.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub activated: Option<bool>,
    pub increment: Option<bool>,
    #[serde(default, deserialize_with = "json_number")]
    pub value: Option<Decimal>,
    pub date_type: Option<DateType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub week_days: Option<String>,
    pub condition_type: Option<ConditionType>,
    pub anticipation_hours: Option<i64>,
    pub min_days: Option<i64>,
}

/// Accepts a JSON integer or fraction. `Decimal`'s own impl reads strings only.
fn json_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    #[derive(Deserialize)]
    struct Number(#[serde(with = "rust_decimal::serde::float")] Decimal);

    Ok(Option::<Number>::deserialize(deserializer)?.map(|n| n.0))
}

impl FilterDraft {
    /// Checks run in a fixed order and stop at the first violation.
    pub fn into_rule(self, id: RuleId) -> Result<Rule, RuleViolation> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(violation("filter name is required")),
        };

        let value = self.value.ok_or_else(|| violation("filter value is required"))?;
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(violation("filter value must be between 0 and 100"));
        }

        let date_type = self.date_type.ok_or_else(|| violation("date type is required"))?;

        let window = match date_type {
            DateType::DateRange | DateType::DateRangeWeekDays => {
                let (Some(first), Some(last)) = (self.start_date, self.end_date) else {
                    return Err(violation(format!(
                        "start date and end date are required for date type {}",
                        date_type_name(date_type)
                    )));
                };
                if first > last {
                    return Err(violation("start date must not be after end date"));
                }
                Some(DateWindow { first, last })
            }
            DateType::EveryDay | DateType::WeekDays => None,
        };

        let days = match date_type {
            DateType::WeekDays | DateType::DateRangeWeekDays => {
                let raw = self.week_days.as_deref().unwrap_or("");
                if raw.trim().is_empty() {
                    return Err(violation(format!(
                        "week days are required for date type {}",
                        date_type_name(date_type)
                    )));
                }
                Some(parse_week_days(raw)?)
            }
            DateType::EveryDay | DateType::DateRange => None,
        };

        let applicability = match (date_type, window, days) {
            (DateType::DateRange, Some(window), _) => Applicability::DateRange(window),
            (DateType::WeekDays, _, Some(days)) => Applicability::WeekDays(days),
            (DateType::DateRangeWeekDays, Some(window), Some(days)) => {
                Applicability::DateRangeWeekDays { window, days }
            }
            _ => Applicability::EveryDay,
        };

        let condition = match self.condition_type.unwrap_or(ConditionType::None) {
            ConditionType::None => Condition::None,
            ConditionType::LastMinute => Condition::LastMinute {
                anticipation_hours: positive(self.anticipation_hours).ok_or_else(|| {
                    violation("anticipation hours must be greater than 0 for LAST_MINUTE")
                })?,
            },
            ConditionType::LongStay => Condition::LongStay {
                min_days: positive(self.min_days)
                    .ok_or_else(|| violation("minimum days must be greater than 0 for LONG_STAY"))?,
            },
        };

        Ok(Rule {
            id,
            name,
            description: self.description,
            activated: self.activated.unwrap_or(true),
            increment: self.increment.unwrap_or(false),
            value,
            applicability,
            condition,
        })
    }
}

fn positive(n: Option<i64>) -> Option<u32> {
    n.filter(|n| *n > 0).and_then(|n| u32::try_from(n).ok())
}

fn date_type_name(t: DateType) -> &'static str {
    match t {
        DateType::EveryDay => "EVERY_DAY",
        DateType::DateRange => "DATE_RANGE",
        DateType::WeekDays => "WEEK_DAYS",
        DateType::DateRangeWeekDays => "DATE_RANGE_WEEK_DAYS",
    }
}

/// Parse `"1,3, 6"` into a weekday set. One bad token rejects the whole list.
pub fn parse_week_days(raw: &str) -> Result<WeekdaySet, RuleViolation> {
    raw.split(',').try_fold(WeekdaySet::default(), |set, token| {
        let token = token.trim();
        token
            .parse::<u32>()
            .ok()
            .and_then(|n| set.with_iso(n))
            .ok_or_else(|| {
                violation(format!(
                    "invalid week day '{token}': expected numbers between 1 and 7"
                ))
            })
    })
}
