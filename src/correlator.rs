// 🔗 Correlator - join filing expense rows with the registry roster
//
// Inner join on registry id. Several roster rows with the same registry id
// fan out into several records. Filing rows with no roster match are
// collected as orphans instead of being silently lost.

use crate::error::PipelineError;
use crate::extractor::ExpenseTable;
use crate::schema::{resolve_column, ColumnCandidates};
use crate::table::{Columns, Table};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedRecord {
    pub registry_id: String,
    pub tax_id: String,
    pub legal_name: String,
    pub expense: Option<Decimal>,
    pub quarter: Option<u8>,
    pub year: Option<i32>,
}

/// Filing rows whose registry id is absent from the roster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrphanEntry {
    pub registry_id: String,
    pub quarter: Option<u8>,
    pub year: Option<i32>,
    /// How many filing rows carried this id
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub records: Vec<CorrelatedRecord>,
    pub orphans: Vec<OrphanEntry>,
}

/// Reporting period stamped on every record of one filing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Period {
    pub quarter: Option<u8>,
    pub year: Option<i32>,
}

impl Period {
    pub fn new(quarter: u8, year: i32) -> Self {
        Period {
            quarter: Some(quarter),
            year: Some(year),
        }
    }
}

// ============================================================================
// CORRELATOR
// ============================================================================

pub struct Correlator {
    pub columns: ColumnCandidates,
}

impl Correlator {
    pub fn new() -> Self {
        Correlator {
            columns: ColumnCandidates::default(),
        }
    }

    pub fn with_columns(columns: ColumnCandidates) -> Self {
        Correlator { columns }
    }

    /// Join and return only the correlated records
    pub fn correlate(&self, expenses: &ExpenseTable, registry: &Table, period: Period) -> Vec<CorrelatedRecord> {
        self.correlate_detailed(expenses, registry, period).records
    }

    /// Join and also report unmatched filing rows.
    ///
    /// When any key column cannot be resolved the problem is logged and the
    /// result is empty: that filing contributes nothing, the run goes on.
    pub fn correlate_detailed(&self, expenses: &ExpenseTable, registry: &Table, period: Period) -> Correlation {
        let columns = match self.resolve(expenses, registry) {
            Ok(columns) => columns,
            Err(err) => {
                warn!("{}", err);
                return Correlation::default();
            }
        };

        debug!(
            expense_key = columns.expense_id,
            registry_key = columns.registry_id,
            tax_id = columns.tax_id,
            legal_name = columns.legal_name,
            "resolved join columns"
        );

        let registry_id_idx = registry.column_index(columns.registry_id).unwrap_or_default();
        let tax_id_idx = registry.column_index(columns.tax_id).unwrap_or_default();
        let legal_name_idx = registry.column_index(columns.legal_name).unwrap_or_default();
        let expense_id_idx = expenses.column_index(columns.expense_id).unwrap_or_default();

        // registry id → roster rows, in roster order
        let mut index: HashMap<&str, Vec<&Vec<String>>> = HashMap::new();
        for row in &registry.rows {
            index.entry(row[registry_id_idx].trim()).or_default().push(row);
        }

        let mut records = Vec::new();
        let mut orphans: BTreeMap<String, usize> = BTreeMap::new();

        for row in &expenses.rows {
            let key = row.fields.get(expense_id_idx).map(|s| s.trim()).unwrap_or("");
            match index.get(key) {
                Some(matches) => {
                    for roster_row in matches {
                        records.push(CorrelatedRecord {
                            registry_id: roster_row[registry_id_idx].trim().to_string(),
                            tax_id: roster_row[tax_id_idx].trim().to_string(),
                            legal_name: roster_row[legal_name_idx].trim().to_string(),
                            expense: row.expense,
                            quarter: period.quarter,
                            year: period.year,
                        });
                    }
                }
                None => *orphans.entry(key.to_string()).or_default() += 1,
            }
        }

        debug!(records = records.len(), orphan_ids = orphans.len(), "correlation finished");

        let orphans = orphans
            .into_iter()
            .map(|(registry_id, rows)| OrphanEntry {
                registry_id,
                quarter: period.quarter,
                year: period.year,
                rows,
            })
            .collect();

        Correlation { records, orphans }
    }

    fn resolve<'a>(
        &self,
        expenses: &'a ExpenseTable,
        registry: &'a Table,
    ) -> Result<JoinColumns<'a>, PipelineError> {
        let expense_id = resolve_column(expenses, &self.columns.expense_registry_id)
            .ok_or_else(|| PipelineError::schema("registry id in filing", &["REG_ANS"], expenses.columns()))?;

        let registry_id = resolve_column(registry, &self.columns.registry_id)
            .ok_or_else(|| PipelineError::schema("registry id in roster", &["REG_ANS"], registry.columns()))?;

        let tax_id = resolve_column(registry, &self.columns.tax_id);
        let legal_name = resolve_column(registry, &self.columns.legal_name);
        let (tax_id, legal_name) = match (tax_id, legal_name) {
            (Some(t), Some(l)) => (t, l),
            _ => {
                return Err(PipelineError::schema(
                    "tax id / legal name in roster",
                    &["CNPJ", "Razao_Social"],
                    registry.columns(),
                ))
            }
        };

        Ok(JoinColumns {
            expense_id,
            registry_id,
            tax_id,
            legal_name,
        })
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge orphan entries from several filings: one entry per
/// (registry id, quarter, year), row counts summed
pub fn merge_orphans(orphans: Vec<OrphanEntry>) -> Vec<OrphanEntry> {
    let mut merged: BTreeMap<(String, Option<u8>, Option<i32>), usize> = BTreeMap::new();
    for orphan in orphans {
        *merged
            .entry((orphan.registry_id, orphan.quarter, orphan.year))
            .or_default() += orphan.rows;
    }

    merged
        .into_iter()
        .map(|((registry_id, quarter, year), rows)| OrphanEntry {
            registry_id,
            quarter,
            year,
            rows,
        })
        .collect()
}

struct JoinColumns<'a> {
    expense_id: &'a str,
    registry_id: &'a str,
    tax_id: &'a str,
    legal_name: &'a str,
}
