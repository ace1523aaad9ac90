use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nibble_core::models::{DATE_FORMAT, FoodEntry};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Days are UTC throughout, so "today" here is the UTC calendar day.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    match s {
        "today" => Ok(today()),
        "yesterday" => Ok(today() - chrono::Duration::days(1)),
        "tomorrow" => Ok(today() + chrono::Duration::days(1)),
        _ => NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

pub(crate) fn parse_optional_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(parse_date).transpose()
}

/// Parse a `--at` value. Accepts RFC 3339, or a date and time without an
/// offset (read as UTC). A bare date logs at 12:00 UTC.
pub(crate) fn parse_logged_at(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = parse_date(s) {
        if let Some(noon) = date.and_hms_opt(12, 0, 0) {
            return Ok(noon.and_utc());
        }
    }
    bail!("Invalid time '{s}'. Use RFC 3339 (2024-06-15T08:30:00Z), 'YYYY-MM-DD HH:MM' or a date")
}

/// Render a quantity with at most two decimals and no trailing zeros.
pub(crate) fn format_number(v: f64) -> String {
    let s = format!("{:.2}", no_neg_zero(v));
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

pub(crate) fn print_entry_table(entries: &[FoodEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Logged (UTC)")]
        logged_at: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Cal/serving")]
        calories_per_serving: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Total")]
        total: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: e.id,
            logged_at: e.logged_at.format("%Y-%m-%d %H:%M").to_string(),
            name: truncate(&e.name, 35),
            calories_per_serving: format_number(e.calories_per_serving),
            servings: format_number(e.servings),
            total: format_number(e.total_calories),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
