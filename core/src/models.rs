use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Storage format for `logged_at`. Fixed-width UTC so that string order is
/// chronological order and the first ten characters are the calendar date.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub id: i64,
    pub name: String,
    pub calories_per_serving: f64,
    pub servings: f64,
    pub total_calories: f64,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFoodEntry {
    pub name: String,
    pub calories_per_serving: f64,
    pub servings: f64,
    /// Defaults to the time of insertion.
    pub logged_at: Option<DateTime<Utc>>,
}

impl NewFoodEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, calories_per_serving: f64, servings: f64) -> Self {
        Self {
            name: name.into(),
            calories_per_serving,
            servings,
            logged_at: None,
        }
    }

    #[must_use]
    pub fn logged_at(mut self, at: DateTime<Utc>) -> Self {
        self.logged_at = Some(at);
        self
    }

    #[must_use]
    pub fn total_calories(&self) -> f64 {
        self.calories_per_serving * self.servings
    }
}

/// Calories logged on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub total_calories: f64,
    pub items_count: i64,
}

impl DailySummary {
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date: date.format(DATE_FORMAT).to_string(),
            total_calories: 0.0,
            items_count: 0,
        }
    }
}

/// Optional inclusive bounds on the calendar day of `logged_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl EntryFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
        }
    }

    /// Build a filter from optional `YYYY-MM-DD` strings. Blank strings count as absent.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ValidationError> {
        let parse_opt = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_date)
                .transpose()
        };
        Ok(Self {
            start_date: parse_opt(start)?,
            end_date: parse_opt(end)?,
        })
    }

    /// Lower bound on the stored timestamp: start of `start_date`.
    #[must_use]
    pub fn lower_bound(&self) -> Option<String> {
        self.start_date
            .and_then(|d| d.and_hms_milli_opt(0, 0, 0, 0))
            .map(|dt| format_timestamp(&dt.and_utc()))
    }

    /// Upper bound on the stored timestamp: last millisecond of `end_date`.
    #[must_use]
    pub fn upper_bound(&self) -> Option<String> {
        self.end_date
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| format_timestamp(&dt.and_utc()))
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate(s.into()))
}

#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Drop sub-millisecond precision so a stored timestamp reads back unchanged.
#[must_use]
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Validate a new entry before it is written.
///
/// Non-finite numbers are rejected along with zero and negatives.
pub fn validate_new_entry(entry: &NewFoodEntry) -> Result<(), ValidationError> {
    if entry.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !is_positive(entry.calories_per_serving) {
        return Err(ValidationError::NonPositiveCalories);
    }
    if !is_positive(entry.servings) {
        return Err(ValidationError::NonPositiveServings);
    }
    // TIMESTAMP_FORMAT is only fixed-width for four-digit years.
    if entry
        .logged_at
        .is_some_and(|at| !(0..=9999).contains(&at.year()))
    {
        return Err(ValidationError::TimestampOutOfRange);
    }
    Ok(())
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}
