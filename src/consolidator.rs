// 📊 Consolidator - validate, detect conflicts, aggregate, measure variability
//
// Stages run in a fixed order over all records of a run:
//   1. CNPJ validation (invalid records leave the pipeline)
//   2. name conflicts per CNPJ (over ALL records, valid or not)
//   3. sum/mean per (CNPJ, legal name, quarter, year)
//   4. sample standard deviation of quarterly totals per (CNPJ, legal name)
//
// Grouping uses ordered maps so output order never depends on input order.

use crate::correlator::CorrelatedRecord;
use crate::error::{PipelineError, Result};
use crate::identifier::is_valid_cnpj;
use crate::money::round2;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// One (CNPJ, legal name, quarter, year) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRecord {
    pub tax_id: String,
    pub legal_name: String,
    pub quarter: u8,
    pub year: i32,
    /// Sum of the non-missing expenses of the group
    pub total: Option<Decimal>,
    /// Mean of the non-missing expenses of the group
    pub mean: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvalidIdentifierEntry {
    pub tax_id: String,
    pub registry_id: String,
    pub legal_name: String,
}

/// Two different legal names seen under the same CNPJ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub tax_id: String,
    pub legal_name_1: String,
    pub legal_name_2: String,
    /// Period of the first record seen for `legal_name_1`
    pub quarter: Option<u8>,
    pub year: Option<i32>,
    pub expense_1: Option<Decimal>,
    pub expense_2: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariabilityEntry {
    pub tax_id: String,
    pub legal_name: String,
    /// Sample standard deviation of quarterly totals; `None` with fewer than two quarters
    pub std_dev: Option<Decimal>,
    pub quarters: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    pub records: Vec<ConsolidatedRecord>,
    pub invalid: Vec<InvalidIdentifierEntry>,
    pub conflicts: Vec<ConflictEntry>,
    pub variability: Vec<VariabilityEntry>,
}

// ============================================================================
// CONSOLIDATOR
// ============================================================================

pub struct Consolidator;

impl Consolidator {
    pub fn new() -> Self {
        Consolidator
    }

    pub fn consolidate(&self, records: &[CorrelatedRecord]) -> Result<Consolidation> {
        let (valid, invalid) = self.validate(records);
        if !invalid.is_empty() {
            warn!(unique_invalid = invalid.len(), "records with invalid CNPJ removed");
        }

        let conflicts = self.detect_conflicts(records);
        let consolidated = self.aggregate(&valid)?;
        let variability = self.variability(&consolidated);

        info!(
            input = records.len(),
            valid = valid.len(),
            groups = consolidated.len(),
            conflicts = conflicts.len(),
            "consolidation finished"
        );

        Ok(Consolidation {
            records: consolidated,
            invalid,
            conflicts,
            variability,
        })
    }

    /// Split records by CNPJ validity; invalid ones are deduplicated
    pub fn validate<'a>(&self, records: &'a [CorrelatedRecord]) -> (Vec<&'a CorrelatedRecord>, Vec<InvalidIdentifierEntry>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        let mut seen = HashSet::new();

        for record in records {
            if is_valid_cnpj(&record.tax_id) {
                valid.push(record);
                continue;
            }

            let entry = InvalidIdentifierEntry {
                tax_id: record.tax_id.clone(),
                registry_id: record.registry_id.clone(),
                legal_name: record.legal_name.clone(),
            };
            if seen.insert(entry.clone()) {
                invalid.push(entry);
            }
        }

        (valid, invalid)
    }

    /// Every pair of distinct legal names under one CNPJ
    pub fn detect_conflicts(&self, records: &[CorrelatedRecord]) -> Vec<ConflictEntry> {
        // CNPJ → distinct names in first-seen order, each with its first record
        let mut by_tax_id: BTreeMap<&str, Vec<&CorrelatedRecord>> = BTreeMap::new();
        for record in records {
            let names = by_tax_id.entry(record.tax_id.as_str()).or_default();
            if !names.iter().any(|r| r.legal_name == record.legal_name) {
                names.push(record);
            }
        }

        let mut conflicts = Vec::new();
        for (tax_id, firsts) in by_tax_id {
            for i in 0..firsts.len() {
                for j in (i + 1)..firsts.len() {
                    conflicts.push(ConflictEntry {
                        tax_id: tax_id.to_string(),
                        legal_name_1: firsts[i].legal_name.clone(),
                        legal_name_2: firsts[j].legal_name.clone(),
                        quarter: firsts[i].quarter,
                        year: firsts[i].year,
                        expense_1: firsts[i].expense.map(round2),
                        expense_2: firsts[j].expense.map(round2),
                    });
                }
            }
        }

        conflicts
    }

    /// Sum and mean per (CNPJ, legal name, quarter, year)
    pub fn aggregate(&self, records: &[&CorrelatedRecord]) -> Result<Vec<ConsolidatedRecord>> {
        check_period_fields(records)?;

        let mut groups: BTreeMap<(&str, &str, u8, i32), Vec<Decimal>> = BTreeMap::new();
        for record in records {
            let (quarter, year) = match (record.quarter, record.year) {
                (Some(q), Some(y)) => (q, y),
                _ => continue,
            };
            let values = groups
                .entry((record.tax_id.as_str(), record.legal_name.as_str(), quarter, year))
                .or_default();
            if let Some(expense) = record.expense {
                values.push(round2(expense));
            }
        }

        Ok(groups
            .into_iter()
            .map(|((tax_id, legal_name, quarter, year), values)| {
                let (total, mean) = sum_and_mean(&values);
                ConsolidatedRecord {
                    tax_id: tax_id.to_string(),
                    legal_name: legal_name.to_string(),
                    quarter,
                    year,
                    total,
                    mean,
                }
            })
            .collect())
    }

    /// Sample standard deviation of quarterly totals per (CNPJ, legal name)
    pub fn variability(&self, records: &[ConsolidatedRecord]) -> Vec<VariabilityEntry> {
        let mut groups: BTreeMap<(&str, &str), Vec<Decimal>> = BTreeMap::new();
        for record in records {
            let values = groups
                .entry((record.tax_id.as_str(), record.legal_name.as_str()))
                .or_default();
            if let Some(total) = record.total {
                values.push(total);
            }
        }

        groups
            .into_iter()
            .map(|((tax_id, legal_name), values)| VariabilityEntry {
                tax_id: tax_id.to_string(),
                legal_name: legal_name.to_string(),
                std_dev: sample_std_dev(&values),
                quarters: values.len(),
            })
            .collect()
    }
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

const RECORD_FIELDS: [&str; 4] = ["CNPJ", "REG_ANS", "RazaoSocial", "ValorDespesas"];

/// Grouping needs quarter and year on every record
fn check_period_fields(records: &[&CorrelatedRecord]) -> Result<()> {
    let mut missing = Vec::new();
    if records.iter().any(|r| r.quarter.is_none()) {
        missing.push("Trimestre".to_string());
    }
    if records.iter().any(|r| r.year.is_none()) {
        missing.push("Ano".to_string());
    }

    if missing.is_empty() {
        return Ok(());
    }

    let mut available: Vec<String> = RECORD_FIELDS.iter().map(|s| s.to_string()).collect();
    for field in ["Trimestre", "Ano"] {
        if !missing.iter().any(|m| m == field) {
            available.push(field.to_string());
        }
    }

    Err(PipelineError::ConsolidationSchema { missing, available })
}

fn sum_and_mean(values: &[Decimal]) -> (Option<Decimal>, Option<Decimal>) {
    if values.is_empty() {
        return (None, None);
    }
    let sum: Decimal = values.iter().copied().sum();
    let mean = sum / Decimal::from(values.len());
    (Some(round2(sum)), Some(round2(mean)))
}

fn sample_std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let n = Decimal::from(values.len());
    let mean = values.iter().copied().sum::<Decimal>() / n;
    let squares: Decimal = values.iter().map(|v| (*v - mean) * (*v - mean)).sum();
    let variance = squares / (n - Decimal::ONE);
    variance.sqrt().map(round2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_A: &str = "11222333000181";
    const VALID_B: &str = "33445566000186";
    const INVALID: &str = "11222333000182";

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn record(tax_id: &str, name: &str, expense: Option<&str>, quarter: u8, year: i32) -> CorrelatedRecord {
        CorrelatedRecord {
            registry_id: "111".to_string(),
            tax_id: tax_id.to_string(),
            legal_name: name.to_string(),
            expense: expense.map(dec),
            quarter: Some(quarter),
            year: Some(year),
        }
    }

    #[test]
    fn test_sum_and_mean_single_row_per_group() {
        let records = vec![
            record(VALID_A, "Alpha", Some("100"), 1, 2024),
            record(VALID_A, "Alpha", Some("50"), 1, 2024),
        ];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].total, Some(dec("150.00")));
        assert_eq!(result.records[0].mean, Some(dec("75.00")));
    }

    #[test]
    fn test_missing_values_excluded_from_mean() {
        let records = vec![
            record(VALID_A, "Alpha", Some("100"), 1, 2024),
            record(VALID_A, "Alpha", None, 1, 2024),
        ];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(result.records[0].total, Some(dec("100")));
        assert_eq!(result.records[0].mean, Some(dec("100")));

        let records = vec![record(VALID_A, "Alpha", None, 1, 2024)];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].total, None);
        assert_eq!(result.records[0].mean, None);
    }

    #[test]
    fn test_mean_is_rounded() {
        let records = vec![
            record(VALID_A, "Alpha", Some("10"), 1, 2024),
            record(VALID_A, "Alpha", Some("10"), 1, 2024),
            record(VALID_A, "Alpha", Some("0.01"), 1, 2024),
        ];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(result.records[0].total, Some(dec("20.01")));
        assert_eq!(result.records[0].mean, Some(dec("6.67")));
    }

    #[test]
    fn test_invalid_cnpj_removed_and_deduplicated() {
        let records = vec![
            record(VALID_A, "Alpha", Some("10"), 1, 2024),
            record(INVALID, "Bad", Some("20"), 1, 2024),
            record(INVALID, "Bad", Some("30"), 2, 2024),
        ];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].tax_id, VALID_A);
        assert_eq!(
            result.invalid,
            vec![InvalidIdentifierEntry {
                tax_id: INVALID.to_string(),
                registry_id: "111".to_string(),
                legal_name: "Bad".to_string(),
            }]
        );
    }

    #[test]
    fn test_conflict_pair() {
        let records = vec![
            record(VALID_A, "Alpha", Some("10"), 1, 2024),
            record(VALID_A, "Beta", Some("20"), 2, 2024),
            record(VALID_A, "Alpha", Some("99"), 3, 2024),
        ];
        let conflicts = Consolidator::new().detect_conflicts(&records);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].legal_name_1, "Alpha");
        assert_eq!(conflicts[0].legal_name_2, "Beta");
        assert_eq!(conflicts[0].expense_1, Some(dec("10")));
        assert_eq!(conflicts[0].expense_2, Some(dec("20")));
        assert_eq!(conflicts[0].quarter, Some(1));
    }

    #[test]
    fn test_three_names_give_three_pairs() {
        let records = vec![
            record(VALID_A, "Alpha", Some("1"), 1, 2024),
            record(VALID_A, "Beta", Some("2"), 1, 2024),
            record(VALID_A, "Gamma", Some("3"), 1, 2024),
            record(VALID_B, "Solo", Some("4"), 1, 2024),
        ];
        let conflicts = Consolidator::new().detect_conflicts(&records);
        assert_eq!(conflicts.len(), 3);
        let pairs: Vec<(&str, &str)> = conflicts
            .iter()
            .map(|c| (c.legal_name_1.as_str(), c.legal_name_2.as_str()))
            .collect();
        assert_eq!(pairs, vec![("Alpha", "Beta"), ("Alpha", "Gamma"), ("Beta", "Gamma")]);
    }

    #[test]
    fn test_conflicts_include_invalid_records() {
        let records = vec![
            record(INVALID, "Alpha", Some("1"), 1, 2024),
            record(INVALID, "Beta", Some("2"), 1, 2024),
        ];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.conflicts.len(), 1);
    }

    #[test]
    fn test_variability() {
        let records = vec![
            record(VALID_A, "Alpha", Some("10"), 1, 2024),
            record(VALID_A, "Alpha", Some("20"), 2, 2024),
            record(VALID_A, "Alpha", Some("30"), 3, 2024),
            record(VALID_B, "Beta", Some("5"), 1, 2024),
        ];
        let result = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(result.variability.len(), 2);

        let alpha = &result.variability[0];
        assert_eq!(alpha.legal_name, "Alpha");
        assert_eq!(alpha.quarters, 3);
        assert_eq!(alpha.std_dev, Some(dec("10.00")));

        let beta = &result.variability[1];
        assert_eq!(beta.std_dev, None);
    }

    #[test]
    fn test_missing_period_is_schema_error() {
        let mut r = record(VALID_A, "Alpha", Some("10"), 1, 2024);
        r.quarter = None;
        match Consolidator::new().consolidate(&[r]) {
            Err(PipelineError::ConsolidationSchema { missing, available }) => {
                assert_eq!(missing, vec!["Trimestre"]);
                assert!(available.contains(&"Ano".to_string()));
                assert!(available.contains(&"CNPJ".to_string()));
            }
            other => panic!("expected consolidation schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_period_on_invalid_records_is_ignored() {
        let mut r = record(INVALID, "Bad", Some("10"), 1, 2024);
        r.year = None;
        let result = Consolidator::new().consolidate(&[r]).unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.invalid.len(), 1);
    }

    #[test]
    fn test_output_independent_of_input_order() {
        let mut records = vec![
            record(VALID_B, "Beta", Some("5"), 2, 2024),
            record(VALID_A, "Alpha", Some("10"), 1, 2024),
            record(VALID_A, "Alpha", Some("20"), 2, 2024),
            record(VALID_A, "Alpha", Some("1.5"), 1, 2024),
        ];
        let first = Consolidator::new().consolidate(&records).unwrap();
        records.reverse();
        let second = Consolidator::new().consolidate(&records).unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.variability, second.variability);
    }

    #[test]
    fn test_empty_input() {
        let result = Consolidator::new().consolidate(&[]).unwrap();
        assert_eq!(result, Consolidation::default());
    }
}
