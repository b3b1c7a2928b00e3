// 🗄️ SQLite Export - enriched consolidated expenses
//
// Re-running a period replaces that period's rows, so the table always holds
// the latest consolidation for each (quarter, year).

use crate::joiner::EnrichedRecord;
use crate::error::Result;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::info;

/// Row as stored in `consolidated_expenses`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExpense {
    pub run_id: String,
    pub tax_id: String,
    pub legal_name: String,
    pub quarter: u8,
    pub year: i32,
    pub total: Option<Decimal>,
    pub mean: Option<Decimal>,
    pub registry_number: String,
    pub category: String,
    pub region: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash safety; in-memory databases report "memory" instead
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS consolidated_expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            tax_id TEXT NOT NULL,
            legal_name TEXT NOT NULL,
            quarter INTEGER NOT NULL,
            year INTEGER NOT NULL,
            total TEXT,
            mean TEXT,
            registry_number TEXT NOT NULL,
            category TEXT NOT NULL,
            region TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (tax_id, legal_name, quarter, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_period ON consolidated_expenses(year, quarter)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_tax_id ON consolidated_expenses(tax_id)",
        [],
    )?;

    Ok(())
}

/// Replace the stored rows of every period present in `records`
pub fn store_enriched(conn: &Connection, run_id: &str, records: &[EnrichedRecord]) -> Result<usize> {
    let periods: BTreeSet<(u8, i32)> = records.iter().map(|e| (e.record.quarter, e.record.year)).collect();

    let tx = conn.unchecked_transaction()?;

    let mut replaced = 0;
    for (quarter, year) in &periods {
        replaced += tx.execute(
            "DELETE FROM consolidated_expenses WHERE quarter = ?1 AND year = ?2",
            params![quarter, year],
        )?;
    }

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO consolidated_expenses (
                run_id, tax_id, legal_name, quarter, year, total, mean,
                registry_number, category, region
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;

        for e in records {
            let r = &e.record;
            inserted += stmt.execute(params![
                run_id,
                r.tax_id,
                r.legal_name,
                r.quarter,
                r.year,
                r.total.map(|d| d.to_string()),
                r.mean.map(|d| d.to_string()),
                e.registry_number,
                e.category,
                e.region,
            ])?;
        }
    }

    tx.commit()?;

    info!(inserted, replaced, periods = periods.len(), "stored enriched rows");

    Ok(inserted)
}

pub fn verify_count(conn: &Connection, run_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM consolidated_expenses WHERE run_id = ?1",
        params![run_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

pub fn get_all_expenses(conn: &Connection) -> Result<Vec<StoredExpense>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, tax_id, legal_name, quarter, year, total, mean,
                registry_number, category, region
         FROM consolidated_expenses
         ORDER BY tax_id, legal_name, year, quarter",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let total: Option<String> = row.get(5)?;
            let mean: Option<String> = row.get(6)?;
            Ok(StoredExpense {
                run_id: row.get(0)?,
                tax_id: row.get(1)?,
                legal_name: row.get(2)?,
                quarter: row.get(3)?,
                year: row.get(4)?,
                total: total.and_then(|s| Decimal::from_str(&s).ok()),
                mean: mean.and_then(|s| Decimal::from_str(&s).ok()),
                registry_number: row.get(7)?,
                category: row.get(8)?,
                region: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
