use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::Stay;

pub type RuleId = u64;

/// Inclusive date window `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }
}

/// Set of ISO weekdays, bit `n - 1` for weekday number `n` (Monday = 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// `None` if `iso` is outside 1..=7.
    pub fn with_iso(self, iso: u32) -> Option<Self> {
        (1..=7).contains(&iso).then(|| Self(self.0 | (1 << (iso - 1))))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << (day.number_from_monday() - 1)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iso_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=7u32).filter(move |n| self.0 & (1 << (n - 1)) != 0)
    }
}

/// Renders as the comma-separated form clients send, e.g. `6,7`.
impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for n in self.iso_numbers() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{n}")?;
            first = false;
        }
        Ok(())
    }
}

/// Which dates a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Applicability {
    EveryDay,
    DateRange(DateWindow),
    WeekDays(WeekdaySet),
    DateRangeWeekDays { window: DateWindow, days: WeekdaySet },
}

impl Applicability {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Applicability::EveryDay => true,
            Applicability::DateRange(window) => window.contains(date),
            Applicability::WeekDays(days) => days.contains(date.weekday()),
            Applicability::DateRangeWeekDays { window, days } => {
                window.contains(date) && days.contains(date.weekday())
            }
        }
    }

    pub fn date_type(&self) -> DateType {
        match self {
            Applicability::EveryDay => DateType::EveryDay,
            Applicability::DateRange(_) => DateType::DateRange,
            Applicability::WeekDays(_) => DateType::WeekDays,
            Applicability::DateRangeWeekDays { .. } => DateType::DateRangeWeekDays,
        }
    }

    pub fn window(&self) -> Option<DateWindow> {
        match self {
            Applicability::DateRange(window) | Applicability::DateRangeWeekDays { window, .. } => {
                Some(*window)
            }
            Applicability::EveryDay | Applicability::WeekDays(_) => None,
        }
    }

    pub fn week_days(&self) -> Option<WeekdaySet> {
        match self {
            Applicability::WeekDays(days) | Applicability::DateRangeWeekDays { days, .. } => {
                Some(*days)
            }
            Applicability::EveryDay | Applicability::DateRange(_) => None,
        }
    }
}

/// Whole-stay qualifier. Evaluated once per stay, never per night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    None,
    LastMinute { anticipation_hours: u32 },
    LongStay { min_days: u32 },
}

impl Condition {
    /// `now` is the evaluation instant. A check-in that already started gives a
    /// negative hour delta, which still satisfies `LastMinute`.
    pub fn is_met(&self, stay: &Stay, now: DateTime<Utc>) -> bool {
        match self {
            Condition::None => true,
            Condition::LastMinute { anticipation_hours } => {
                let check_in = stay.start.and_time(NaiveTime::MIN).and_utc();
                (check_in - now).num_hours() <= i64::from(*anticipation_hours)
            }
            Condition::LongStay { min_days } => stay.nights() >= *min_days,
        }
    }

    pub fn condition_type(&self) -> ConditionType {
        match self {
            Condition::None => ConditionType::None,
            Condition::LastMinute { .. } => ConditionType::LastMinute,
            Condition::LongStay { .. } => ConditionType::LongStay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateType {
    EveryDay,
    DateRange,
    WeekDays,
    DateRangeWeekDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    None,
    LastMinute,
    LongStay,
}

/// A validated pricing rule. `value` is a percentage in `[0, 100]`; `increment`
/// marks a surcharge, otherwise the rule is a discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub description: Option<String>,
    pub activated: bool,
    pub increment: bool,
    pub value: Decimal,
    pub applicability: Applicability,
    pub condition: Condition,
}
