use anyhow::Result;

use nibble_core::models::NewFoodEntry;
use nibble_core::service::NibbleService;

use super::helpers::{format_number, parse_logged_at};

pub(crate) fn cmd_add(
    svc: &NibbleService,
    name: &str,
    calories: f64,
    servings: f64,
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let logged_at = at.map(parse_logged_at).transpose()?;

    let entry = svc.add_food_item(&NewFoodEntry {
        name: name.to_string(),
        calories_per_serving: calories,
        servings,
        logged_at,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let name = &entry.name;
        let id = entry.id;
        let servings = format_number(entry.servings);
        let total = format_number(entry.total_calories);
        println!("Logged: {name} x{servings}: {total} kcal (id: {id})");
    }

    Ok(())
}
