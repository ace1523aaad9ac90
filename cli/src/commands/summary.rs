use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nibble_core::service::NibbleService;

use super::helpers::format_number;

pub(crate) fn cmd_summary(svc: &NibbleService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Items")]
        items: i64,
        #[tabled(rename = "Calories")]
        calories: String,
    }

    let summaries = svc.get_daily_summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        eprintln!("No entries logged yet");
        process::exit(2);
    }

    let rows: Vec<SummaryRow> = summaries
        .iter()
        .map(|s| SummaryRow {
            date: s.date.clone(),
            items: s.items_count,
            calories: format_number(s.total_calories),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_today(svc: &NibbleService, json: bool) -> Result<()> {
    let summary = svc.get_today_summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let date = &summary.date;
    let total = format_number(summary.total_calories);
    let items = summary.items_count;
    println!("=== {date} (UTC) ===\n");
    if items == 0 {
        println!("  No food logged today yet");
    } else {
        println!("  {total} kcal from {items} item(s)");
    }

    Ok(())
}
