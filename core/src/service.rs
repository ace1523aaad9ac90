use std::path::Path;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::models::{DailySummary, EntryFilter, FoodEntry, NewFoodEntry};

/// The four food-log operations over an explicitly owned store handle.
///
/// Open one per process and hand it (or a lock around it) to whatever serves
/// requests; it closes when dropped.
pub struct NibbleService {
    db: Database,
}

impl NibbleService {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(db_path)?))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn add_food_item(&self, entry: &NewFoodEntry) -> Result<FoodEntry> {
        let created = self.db.insert_entry(entry)?;
        info!(
            id = created.id,
            name = %created.name,
            total_calories = created.total_calories,
            "Logged food entry"
        );
        Ok(created)
    }

    pub fn get_food_items(&self, filter: &EntryFilter) -> Result<Vec<FoodEntry>> {
        self.db.list_entries(filter)
    }

    pub fn get_food_item(&self, id: i64) -> Result<FoodEntry> {
        self.db.get_entry(id)
    }

    pub fn delete_food_item(&self, id: i64) -> Result<FoodEntry> {
        let removed = self.db.delete_entry(id)?;
        info!(id, name = %removed.name, "Deleted food entry");
        Ok(removed)
    }

    pub fn get_daily_summary(&self) -> Result<Vec<DailySummary>> {
        self.db.daily_summaries()
    }

    /// Summary for one UTC day, zero-valued when nothing was logged.
    pub fn get_summary_for_date(&self, date: NaiveDate) -> Result<DailySummary> {
        self.db.summary_for_date(date)
    }

    /// Summary for the current UTC day.
    pub fn get_today_summary(&self) -> Result<DailySummary> {
        self.get_summary_for_date(Utc::now().date_naive())
    }
}
