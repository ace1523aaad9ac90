use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{
    DailySummary, EntryFilter, FoodEntry, NewFoodEntry, format_timestamp, truncate_to_millis,
    validate_new_entry,
};

/// How long a writer waits for another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "id, name, calories_per_serving, servings, total_calories, logged_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("journal_mode = {mode}");
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            // AUTOINCREMENT keeps ids of deleted rows from being handed out again.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS food_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                    calories_per_serving REAL NOT NULL CHECK (calories_per_serving > 0),
                    servings REAL NOT NULL CHECK (servings > 0),
                    total_calories REAL NOT NULL,
                    logged_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_food_entries_logged_at ON food_entries(logged_at);

                PRAGMA user_version = 1;",
            )?;
            info!("Migrated database schema to version 1");
        }

        Ok(())
    }

    /// Start a write transaction that takes the write lock up front, so a
    /// competing connection waits on `busy_timeout` instead of failing with a
    /// stale snapshot.
    fn write_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // --- Row mapping helpers ---

    // Expects ENTRY_COLUMNS in order.
    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodEntry> {
        let logged_at: String = row.get(5)?;
        let logged_at = DateTime::parse_from_rfc3339(&logged_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        Ok(FoodEntry {
            id: row.get(0)?,
            name: row.get(1)?,
            calories_per_serving: row.get(2)?,
            servings: row.get(3)?,
            total_calories: row.get(4)?,
            logged_at,
        })
    }

    fn summary_from_row(row: &rusqlite::Row) -> rusqlite::Result<DailySummary> {
        Ok(DailySummary {
            date: row.get(0)?,
            total_calories: row.get(1)?,
            items_count: row.get(2)?,
        })
    }

    // --- Food entries ---

    pub fn insert_entry(&self, entry: &NewFoodEntry) -> Result<FoodEntry> {
        validate_new_entry(entry)?;

        let logged_at = truncate_to_millis(entry.logged_at.unwrap_or_else(Utc::now));
        let tx = self.write_transaction()?;
        tx.execute(
            "INSERT INTO food_entries (name, calories_per_serving, servings, total_calories, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.name.trim(),
                entry.calories_per_serving,
                entry.servings,
                entry.total_calories(),
                format_timestamp(&logged_at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let stored = tx.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM food_entries WHERE id = ?1"),
            params![id],
            Self::entry_from_row,
        )?;
        tx.commit()?;
        Ok(stored)
    }

    pub fn get_entry(&self, id: i64) -> Result<FoodEntry> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM food_entries WHERE id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .optional()?
            .ok_or(Error::NotFound(id))
    }

    /// Entries whose `logged_at` falls inside the filter, newest first.
    /// Entries logged at the same instant keep insertion order.
    pub fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<FoodEntry>> {
        let mut conditions = Vec::new();
        let mut bounds = Vec::new();

        if let Some(lower) = filter.lower_bound() {
            conditions.push("logged_at >= ?");
            bounds.push(lower);
        }
        if let Some(upper) = filter.upper_bound() {
            conditions.push("logged_at <= ?");
            bounds.push(upper);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM food_entries {where_clause} ORDER BY logged_at DESC, id ASC"
        );
        debug!("Executing query: {sql} with bounds {bounds:?}");

        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(rusqlite::params_from_iter(bounds.iter()), Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Delete an entry and return what was removed.
    ///
    /// The lookup and the delete are one statement, so when two callers race
    /// on the same id only one of them gets the row back.
    pub fn delete_entry(&self, id: i64) -> Result<FoodEntry> {
        let tx = self.write_transaction()?;
        let removed = tx
            .query_row(
                &format!("DELETE FROM food_entries WHERE id = ?1 RETURNING {ENTRY_COLUMNS}"),
                params![id],
                Self::entry_from_row,
            )
            .optional()?;
        let Some(removed) = removed else {
            return Err(Error::NotFound(id));
        };
        tx.commit()?;
        Ok(removed)
    }

    // --- Daily summaries ---

    /// Per-day totals over every entry, most recent day first.
    pub fn daily_summaries(&self) -> Result<Vec<DailySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT substr(logged_at, 1, 10) AS day, SUM(total_calories), COUNT(*)
             FROM food_entries
             GROUP BY day
             ORDER BY day DESC",
        )?;
        let summaries = stmt
            .query_map([], Self::summary_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Totals for a single day; zero-valued when nothing was logged.
    pub fn summary_for_date(&self, date: NaiveDate) -> Result<DailySummary> {
        let filter = EntryFilter::between(date, date);
        let (total_calories, items_count): (f64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(total_calories), 0.0), COUNT(*)
             FROM food_entries
             WHERE logged_at >= ?1 AND logged_at <= ?2",
            params![filter.lower_bound(), filter.upper_bound()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DailySummary {
            total_calories,
            items_count,
            ..DailySummary::empty(date)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn log(db: &Database, name: &str, cal: f64, servings: f64, when: DateTime<Utc>) -> FoodEntry {
        db.insert_entry(&NewFoodEntry::new(name, cal, servings).logged_at(when))
            .unwrap()
    }

    fn count(db: &Database) -> i64 {
        db.conn
            .query_row("SELECT COUNT(*) FROM food_entries", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_and_get_entry() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_entry(&NewFoodEntry::new("Apple", 95.0, 2.0))
            .unwrap();

        assert!(entry.id > 0);
        assert_eq!(entry.name, "Apple");
        assert_eq!(entry.calories_per_serving, 95.0);
        assert_eq!(entry.servings, 2.0);
        assert_eq!(entry.total_calories, 190.0);

        let fetched = db.get_entry(entry.id).unwrap();
        assert_eq!(fetched, entry);
    }

    #[test]
    fn test_insert_fractional_servings() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_entry(&NewFoodEntry::new("Pizza Slice", 285.0, 3.5))
            .unwrap();
        assert_eq!(entry.total_calories, 997.5);
    }

    #[test]
    fn test_insert_defaults_logged_at_to_now() {
        let db = Database::open_in_memory().unwrap();
        let before = truncate_to_millis(Utc::now());
        let entry = db
            .insert_entry(&NewFoodEntry::new("Banana", 105.0, 1.0))
            .unwrap();
        let after = Utc::now();

        assert!(entry.logged_at >= before);
        assert!(entry.logged_at <= after);
    }

    #[test]
    fn test_insert_keeps_supplied_logged_at() {
        let db = Database::open_in_memory().unwrap();
        let when = at(2024, 6, 15, 8, 30, 0);
        let entry = log(&db, "Oatmeal", 150.0, 1.0, when);
        assert_eq!(entry.logged_at, when);
    }

    #[test]
    fn test_insert_trims_name() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_entry(&NewFoodEntry::new("  Greek Yogurt ", 100.0, 1.0))
            .unwrap();
        assert_eq!(entry.name, "Greek Yogurt");
    }

    #[test]
    fn test_insert_invalid_persists_nothing() {
        let db = Database::open_in_memory().unwrap();

        let cases = [
            (NewFoodEntry::new("", 100.0, 1.0), ValidationError::EmptyName),
            (NewFoodEntry::new("Apple", 0.0, 1.0), ValidationError::NonPositiveCalories),
            (NewFoodEntry::new("Apple", -5.0, 1.0), ValidationError::NonPositiveCalories),
            (NewFoodEntry::new("Apple", 95.0, 0.0), ValidationError::NonPositiveServings),
            (NewFoodEntry::new("Apple", 95.0, -1.0), ValidationError::NonPositiveServings),
        ];
        for (entry, expected) in cases {
            match db.insert_entry(&entry) {
                Err(Error::Validation(e)) => assert_eq!(e, expected),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_insert_out_of_range_year_is_validation_error() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Apple", 95.0, 1.0, at(2024, 6, 15, 8, 0, 0));

        let far_future = NewFoodEntry::new("Cake", 400.0, 1.0).logged_at(at(10_000, 1, 1, 0, 0, 0));
        assert!(matches!(
            db.insert_entry(&far_future),
            Err(Error::Validation(ValidationError::TimestampOutOfRange))
        ));
        assert_eq!(count(&db), 1);

        let last_year = log(&db, "Cake", 400.0, 1.0, at(9999, 12, 31, 23, 59, 59));
        assert_eq!(db.get_entry(last_year.id).unwrap(), last_year);
    }

    #[test]
    fn test_get_entry_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_entry(42), Err(Error::NotFound(42))));
    }

    #[test]
    fn test_delete_entry_returns_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let entry = log(&db, "Apple", 95.0, 2.0, at(2024, 6, 15, 12, 0, 0));

        let removed = db.delete_entry(entry.id).unwrap();
        assert_eq!(removed, entry);
        assert_eq!(count(&db), 0);

        // Deleting again reports not-found
        assert!(matches!(
            db.delete_entry(entry.id),
            Err(Error::NotFound(id)) if id == entry.id
        ));
    }

    #[test]
    fn test_delete_missing_on_empty_store() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.delete_entry(999), Err(Error::NotFound(999))));
    }

    #[test]
    fn test_delete_removes_only_target() {
        let db = Database::open_in_memory().unwrap();
        let a = log(&db, "Apple", 95.0, 1.0, at(2024, 6, 15, 9, 0, 0));
        let b = log(&db, "Banana", 105.0, 1.0, at(2024, 6, 15, 10, 0, 0));

        db.delete_entry(a.id).unwrap();
        let remaining = db.list_entries(&EntryFilter::all()).unwrap();
        assert_eq!(remaining, vec![b]);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let db = Database::open_in_memory().unwrap();
        let first = log(&db, "Apple", 95.0, 1.0, at(2024, 6, 15, 9, 0, 0));
        db.delete_entry(first.id).unwrap();
        let second = log(&db, "Banana", 105.0, 1.0, at(2024, 6, 15, 10, 0, 0));
        assert!(second.id > first.id);
    }

    #[test]
    fn test_list_entries_newest_first() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Apple", 80.0, 1.0, at(2024, 6, 15, 8, 0, 0));
        log(&db, "Banana", 105.0, 2.0, at(2024, 6, 15, 8, 0, 1));
        log(&db, "Toast", 120.0, 1.0, at(2024, 6, 14, 19, 0, 0));

        let entries = db.list_entries(&EntryFilter::all()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Banana", "Apple", "Toast"]);
        assert!(entries.windows(2).all(|w| w[0].logged_at >= w[1].logged_at));
    }

    #[test]
    fn test_list_entries_ties_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let when = at(2024, 6, 15, 12, 0, 0);
        let a = log(&db, "First", 100.0, 1.0, when);
        let b = log(&db, "Second", 100.0, 1.0, when);

        let entries = db.list_entries(&EntryFilter::all()).unwrap();
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[test]
    fn test_list_entries_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.list_entries(&EntryFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_list_entries_inclusive_range() {
        let db = Database::open_in_memory().unwrap();
        let before = at(2024, 6, 9, 23, 59, 59);
        let start_edge = at(2024, 6, 10, 0, 0, 0);
        let end_edge = Utc.timestamp_millis_opt(
            at(2024, 6, 12, 23, 59, 59).timestamp_millis() + 999,
        )
        .unwrap();
        let after = at(2024, 6, 13, 0, 0, 0);

        log(&db, "Before", 100.0, 1.0, before);
        log(&db, "StartEdge", 100.0, 1.0, start_edge);
        log(&db, "EndEdge", 100.0, 1.0, end_edge);
        log(&db, "After", 100.0, 1.0, after);

        let filter = EntryFilter::between(date(2024, 6, 10), date(2024, 6, 12));
        let entries = db.list_entries(&filter).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["EndEdge", "StartEdge"]);
    }

    #[test]
    fn test_list_entries_start_only() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Old Apple", 80.0, 1.0, at(2024, 6, 14, 12, 0, 0));
        log(&db, "Fresh Banana", 105.0, 1.0, at(2024, 6, 15, 12, 0, 0));

        let filter = EntryFilter {
            start_date: Some(date(2024, 6, 15)),
            end_date: None,
        };
        let entries = db.list_entries(&filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Fresh Banana");
    }

    #[test]
    fn test_list_entries_end_only() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Yesterday Apple", 80.0, 1.0, at(2024, 6, 14, 22, 0, 0));
        log(&db, "Tomorrow Banana", 105.0, 1.0, at(2024, 6, 16, 7, 0, 0));

        let filter = EntryFilter {
            start_date: None,
            end_date: Some(date(2024, 6, 14)),
        };
        let entries = db.list_entries(&filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Yesterday Apple");
    }

    #[test]
    fn test_list_entries_inverted_range_is_empty() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Apple", 80.0, 1.0, at(2024, 6, 15, 12, 0, 0));

        let filter = EntryFilter::between(date(2024, 6, 16), date(2024, 6, 14));
        assert!(db.list_entries(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_daily_summaries_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.daily_summaries().unwrap().is_empty());
    }

    #[test]
    fn test_daily_summaries_single_day() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Apple", 80.0, 1.0, at(2024, 6, 15, 8, 0, 0));
        log(&db, "Banana", 105.0, 2.0, at(2024, 6, 15, 13, 0, 0));

        let summaries = db.daily_summaries().unwrap();
        assert_eq!(
            summaries,
            vec![DailySummary {
                date: "2024-06-15".to_string(),
                total_calories: 290.0,
                items_count: 2,
            }]
        );
    }

    #[test]
    fn test_daily_summaries_multiple_days_newest_first() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Lunch", 150.0, 2.0, at(2024, 6, 15, 12, 0, 0));
        log(&db, "Dinner", 200.0, 1.0, at(2024, 6, 14, 19, 0, 0));
        log(&db, "Breakfast", 100.0, 1.0, at(2024, 6, 13, 7, 0, 0));
        log(&db, "Snack", 175.0, 2.0, at(2024, 6, 13, 16, 0, 0));

        let summaries = db.daily_summaries().unwrap();
        let rows: Vec<(&str, f64, i64)> = summaries
            .iter()
            .map(|s| (s.date.as_str(), s.total_calories, s.items_count))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("2024-06-15", 300.0, 1),
                ("2024-06-14", 200.0, 1),
                ("2024-06-13", 450.0, 2),
            ]
        );
    }

    #[test]
    fn test_daily_summaries_keep_fractions() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Apple", 95.0, 2.0, at(2024, 6, 15, 8, 0, 0));
        log(&db, "Pizza Slice", 285.0, 3.5, at(2024, 6, 15, 20, 0, 0));

        let summaries = db.daily_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_calories, 1187.5);
    }

    #[test]
    fn test_daily_summaries_group_on_utc_day() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Late", 100.0, 1.0, at(2024, 6, 14, 23, 59, 59));
        log(&db, "Early", 100.0, 1.0, at(2024, 6, 15, 0, 0, 0));

        let summaries = db.daily_summaries().unwrap();
        let dates: Vec<&str> = summaries.iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-06-15", "2024-06-14"]);
    }

    #[test]
    fn test_daily_summaries_exclude_deleted() {
        let db = Database::open_in_memory().unwrap();
        let a = log(&db, "Apple", 80.0, 1.0, at(2024, 6, 15, 8, 0, 0));
        log(&db, "Banana", 210.0, 1.0, at(2024, 6, 15, 9, 0, 0));
        db.delete_entry(a.id).unwrap();

        let summaries = db.daily_summaries().unwrap();
        assert_eq!(summaries[0].items_count, 1);
        assert_eq!(summaries[0].total_calories, 210.0);
    }

    #[test]
    fn test_summary_for_date() {
        let db = Database::open_in_memory().unwrap();
        log(&db, "Apple", 80.0, 1.0, at(2024, 6, 15, 8, 0, 0));
        log(&db, "Banana", 210.0, 1.0, at(2024, 6, 15, 23, 0, 0));
        log(&db, "Other day", 500.0, 1.0, at(2024, 6, 16, 0, 0, 0));

        let summary = db.summary_for_date(date(2024, 6, 15)).unwrap();
        assert_eq!(summary.date, "2024-06-15");
        assert_eq!(summary.items_count, 2);
        assert_eq!(summary.total_calories, 290.0);
    }

    #[test]
    fn test_summary_for_date_empty() {
        let db = Database::open_in_memory().unwrap();
        let summary = db.summary_for_date(date(2024, 6, 15)).unwrap();
        assert_eq!(summary, DailySummary::empty(date(2024, 6, 15)));
    }

    #[test]
    fn test_migrate_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        // Running again is a no-op
        db.migrate().unwrap();
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nibble.db");

        let id = {
            let db = Database::open(&path).unwrap();
            log(&db, "Apple", 95.0, 2.0, at(2024, 6, 15, 8, 0, 0)).id
        };

        let db = Database::open(&path).unwrap();
        let entry = db.get_entry(id).unwrap();
        assert_eq!(entry.name, "Apple");
        assert_eq!(entry.total_calories, 190.0);
    }

    #[test]
    fn test_concurrent_delete_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nibble.db");

        let id = {
            let db = Database::open(&path).unwrap();
            log(&db, "Apple", 95.0, 2.0, at(2024, 6, 15, 8, 0, 0)).id
        };

        let results: Vec<Result<FoodEntry>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let path = path.clone();
                    s.spawn(move || Database::open(&path)?.delete_entry(id))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let not_found = results
            .iter()
            .filter(|r| matches!(r, Err(Error::NotFound(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(not_found, 1);
    }
}
