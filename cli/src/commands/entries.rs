use anyhow::Result;
use std::process;

use nibble_core::Error;
use nibble_core::models::EntryFilter;
use nibble_core::service::NibbleService;

use super::helpers::{format_number, json_error, parse_optional_date, print_entry_table};

pub(crate) fn cmd_list(
    svc: &NibbleService,
    from: Option<&str>,
    to: Option<&str>,
    json: bool,
) -> Result<()> {
    let filter = EntryFilter {
        start_date: parse_optional_date(from)?,
        end_date: parse_optional_date(to)?,
    };
    let entries = svc.get_food_items(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No entries found");
        process::exit(2);
    }

    print_entry_table(&entries);
    let count = entries.len();
    let total: f64 = entries.iter().map(|e| e.total_calories).sum();
    let total = format_number(total);
    println!("  {count} entries, {total} kcal");

    Ok(())
}

pub(crate) fn cmd_delete(svc: &NibbleService, entry_id: i64, json: bool) -> Result<()> {
    match svc.delete_food_item(entry_id) {
        Ok(removed) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&removed)?);
            } else {
                let name = &removed.name;
                let total = format_number(removed.total_calories);
                let when = removed.logged_at.format("%Y-%m-%d %H:%M");
                println!("Deleted entry {entry_id}: {name} ({total} kcal, logged {when} UTC)");
            }
            Ok(())
        }
        Err(Error::NotFound(_)) => {
            if json {
                println!("{}", json_error(&format!("Entry {entry_id} not found")));
            } else {
                eprintln!("Entry {entry_id} not found");
            }
            process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
