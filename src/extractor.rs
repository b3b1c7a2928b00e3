// 📥 Expense Extractor - one filing file → filtered expense rows
//
// Supported layouts: .csv (';' or ','), .txt (tab), .xlsx (first sheet).
// Rows are filtered on the description column, both balances are parsed and
// rounded, then expense = closing - opening.

use crate::config::{CategoryFilter, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::money::{parse_amount_rounded, round2};
use crate::schema::{resolve_column, ColumnCandidates};
use crate::table::{extension_of, Columns, Table};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::debug;

// ============================================================================
// FILE FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// .csv - semicolon or comma delimited
    DelimitedText,
    /// .txt - tab delimited
    TabDelimited,
    /// .xlsx
    Spreadsheet,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<FileFormat> {
        match extension_of(path).as_deref() {
            Some("csv") => Some(FileFormat::DelimitedText),
            Some("txt") => Some(FileFormat::TabDelimited),
            Some("xlsx") => Some(FileFormat::Spreadsheet),
            _ => None,
        }
    }

    pub fn load(&self, path: &Path) -> Result<Table> {
        match self {
            FileFormat::DelimitedText => Table::from_delimited_sniffed(path),
            FileFormat::TabDelimited => Table::from_delimited(path, b'\t'),
            FileFormat::Spreadsheet => Table::from_spreadsheet(path),
        }
    }
}

// ============================================================================
// EXPENSE ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRow {
    /// Every original cell, aligned with `ExpenseTable::headers`
    pub fields: Vec<String>,
    pub description: String,
    pub opening: Option<Decimal>,
    pub closing: Option<Decimal>,
    /// closing - opening, missing when either balance is missing
    pub expense: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseTable {
    pub headers: Vec<String>,
    pub rows: Vec<ExpenseRow>,
}

impl Columns for ExpenseTable {
    fn columns(&self) -> &[String] {
        &self.headers
    }
}

impl ExpenseTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw cell of a row by column name
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.fields.get(col)).map(|s| s.as_str())
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

pub struct ExpenseExtractor {
    pub filter: CategoryFilter,
    pub columns: ColumnCandidates,
}

impl ExpenseExtractor {
    pub fn new() -> Self {
        ExpenseExtractor {
            filter: CategoryFilter::default(),
            columns: ColumnCandidates::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        ExpenseExtractor {
            filter: config.category_filter.clone(),
            columns: config.columns.clone(),
        }
    }

    pub fn with_filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Load and extract one filing file
    pub fn extract(&self, path: &Path) -> Result<ExpenseTable> {
        let format = FileFormat::from_path(path).ok_or_else(|| PipelineError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;

        let table = format.load(path)?;
        debug!(
            file = %path.display(),
            rows = table.len(),
            columns = ?table.headers,
            "loaded filing"
        );

        self.extract_table(table)
    }

    /// Filter and compute expenses over an already loaded table
    pub fn extract_table(&self, table: Table) -> Result<ExpenseTable> {
        let description_col = resolve_column(&table, &self.columns.description);
        let opening_col = resolve_column(&table, &self.columns.opening_balance);
        let closing_col = resolve_column(&table, &self.columns.closing_balance);

        let (description_col, opening_col, closing_col) = match (description_col, opening_col, closing_col) {
            (Some(d), Some(o), Some(c)) => (d, o, c),
            (d, o, c) => {
                let mut missing = Vec::new();
                if d.is_none() {
                    missing.push(first_name(&self.columns.description, "DESCRICAO"));
                }
                if o.is_none() {
                    missing.push(first_name(&self.columns.opening_balance, "VL_SALDO_INICIAL"));
                }
                if c.is_none() {
                    missing.push(first_name(&self.columns.closing_balance, "VL_SALDO_FINAL"));
                }
                let missing: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
                return Err(PipelineError::schema("expense extraction", &missing, &table.headers));
            }
        };

        let description_idx = table.column_index(description_col).unwrap_or_default();
        let opening_idx = table.column_index(opening_col).unwrap_or_default();
        let closing_idx = table.column_index(closing_col).unwrap_or_default();

        let total = table.len();
        let Table { headers, rows } = table;

        let rows: Vec<ExpenseRow> = rows
            .into_iter()
            .filter(|fields| self.filter.accepts(&fields[description_idx]))
            .map(|fields| {
                let opening = parse_amount_rounded(&fields[opening_idx]);
                let closing = parse_amount_rounded(&fields[closing_idx]);
                let expense = match (opening, closing) {
                    (Some(o), Some(c)) => Some(round2(c - o)),
                    _ => None,
                };
                ExpenseRow {
                    description: fields[description_idx].trim().to_string(),
                    fields,
                    opening,
                    closing,
                    expense,
                }
            })
            .collect();

        debug!(kept = rows.len(), total, "filtered expense rows");

        Ok(ExpenseTable { headers, rows })
    }
}

impl Default for ExpenseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn first_name(candidates: &[String], fallback: &str) -> String {
    candidates.first().cloned().unwrap_or_else(|| fallback.to_string())
}
