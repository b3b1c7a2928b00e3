// 🏢 Registry Joiner - enrich consolidated rows with roster attributes
//
// The roster is deduplicated by CNPJ (first occurrence wins) before the join,
// so the left join can never add or drop rows. A row-count mismatch is an
// invariant violation and always an error.
//
// Separately, CNPJs repeated in the raw roster with differing attributes are
// reported as inconsistencies.

use crate::consolidator::ConsolidatedRecord;
use crate::error::{PipelineError, Result};
use crate::schema::{resolve_column, ColumnCandidates};
use crate::table::{Columns, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Value used for every enrichment column when the CNPJ is not in the roster
pub const NO_REGISTRY_MATCH: &str = "no registry match";

/// Suffix appended to values of fields that diverge across duplicates
pub const INCONSISTENT_TAG: &str = "[INCONSISTENTE]";

// ============================================================================
// OUTPUT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub record: ConsolidatedRecord,
    pub registry_number: String,
    pub category: String,
    pub region: String,
}

/// One CNPJ that appears several times in the roster with differing data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryInconsistency {
    pub tax_id: String,
    /// Values of the checked fields, one entry per roster occurrence
    pub occurrences: Vec<Vec<String>>,
    /// Names of the checked fields whose values differ
    pub inconsistent_fields: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InconsistencyReport {
    /// Checked fields (resolved roster column names), in column order
    pub fields: Vec<String>,
    pub entries: Vec<RegistryInconsistency>,
}

impl InconsistencyReport {
    pub fn max_occurrences(&self) -> usize {
        self.entries.iter().map(|e| e.occurrences.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RegistryInconsistency {
    pub fn is_inconsistent(&self, field: &str) -> bool {
        self.inconsistent_fields.iter().any(|f| f == field)
    }
}

// ============================================================================
// JOINER
// ============================================================================

pub struct RegistryJoiner {
    pub columns: ColumnCandidates,
}

struct AttributeColumns<'a> {
    tax_id: &'a str,
    registry_number: &'a str,
    category: &'a str,
    region: &'a str,
}

impl RegistryJoiner {
    pub fn new() -> Self {
        RegistryJoiner {
            columns: ColumnCandidates::default(),
        }
    }

    pub fn with_columns(columns: ColumnCandidates) -> Self {
        RegistryJoiner { columns }
    }

    fn resolve<'a>(&self, registry: &'a Table) -> Result<AttributeColumns<'a>> {
        let tax_id = resolve_column(registry, &self.columns.tax_id);
        let registry_number = resolve_column(registry, &self.columns.registry_number);
        let category = resolve_column(registry, &self.columns.category);
        let region = resolve_column(registry, &self.columns.region);

        match (tax_id, registry_number, category, region) {
            (Some(tax_id), Some(registry_number), Some(category), Some(region)) => Ok(AttributeColumns {
                tax_id,
                registry_number,
                category,
                region,
            }),
            (t, n, c, r) => {
                let missing: Vec<&str> = [(t, "CNPJ"), (n, "REGISTRO_OPERADORA"), (c, "Modalidade"), (r, "UF")]
                    .iter()
                    .filter(|(resolved, _)| resolved.is_none())
                    .map(|(_, name)| *name)
                    .collect();
                Err(PipelineError::schema("registry enrichment", &missing, registry.columns()))
            }
        }
    }

    /// Left join on CNPJ adding registry number, category and region
    pub fn enrich(&self, consolidated: &[ConsolidatedRecord], registry: &Table) -> Result<Vec<EnrichedRecord>> {
        let cols = self.resolve(registry)?;
        let tax_idx = registry.column_index(cols.tax_id).unwrap_or_default();
        let number_idx = registry.column_index(cols.registry_number).unwrap_or_default();
        let category_idx = registry.column_index(cols.category).unwrap_or_default();
        let region_idx = registry.column_index(cols.region).unwrap_or_default();

        // private deduplicated view of the roster: CNPJ → first row
        let mut first_rows: HashMap<&str, &Vec<String>> = HashMap::new();
        for row in &registry.rows {
            first_rows.entry(row[tax_idx].trim()).or_insert(row);
        }

        let mut unmatched = 0usize;
        let enriched: Vec<EnrichedRecord> = consolidated
            .iter()
            .map(|record| match first_rows.get(record.tax_id.trim()) {
                Some(row) => EnrichedRecord {
                    record: record.clone(),
                    registry_number: row[number_idx].trim().to_string(),
                    category: row[category_idx].trim().to_string(),
                    region: row[region_idx].trim().to_string(),
                },
                None => {
                    unmatched += 1;
                    EnrichedRecord {
                        record: record.clone(),
                        registry_number: NO_REGISTRY_MATCH.to_string(),
                        category: NO_REGISTRY_MATCH.to_string(),
                        region: NO_REGISTRY_MATCH.to_string(),
                    }
                }
            })
            .collect();

        if enriched.len() != consolidated.len() {
            return Err(PipelineError::JoinCardinality {
                expected: consolidated.len(),
                actual: enriched.len(),
            });
        }

        if unmatched > 0 {
            warn!(unmatched, "consolidated rows without registry match");
        }
        info!(rows = enriched.len(), "registry enrichment finished");

        Ok(enriched)
    }

    /// CNPJs repeated in the raw roster whose attributes disagree
    pub fn report_inconsistencies(&self, registry: &Table) -> Result<InconsistencyReport> {
        let cols = self.resolve(registry)?;
        let tax_idx = registry.column_index(cols.tax_id).unwrap_or_default();

        let mut checked: Vec<(&str, usize)> = [cols.registry_number, cols.category, cols.region]
            .iter()
            .filter_map(|name| registry.column_index(name).map(|idx| (*name, idx)))
            .collect();
        // one column can serve several roles; check it once
        checked.sort_by_key(|(_, idx)| *idx);
        checked.dedup_by_key(|(_, idx)| *idx);

        let mut by_tax_id: BTreeMap<&str, Vec<&Vec<String>>> = BTreeMap::new();
        for row in &registry.rows {
            by_tax_id.entry(row[tax_idx].trim()).or_default().push(row);
        }

        let mut entries = Vec::new();
        for (tax_id, rows) in by_tax_id {
            if rows.len() < 2 {
                continue;
            }

            let occurrences: Vec<Vec<String>> = rows
                .iter()
                .map(|row| checked.iter().map(|(_, idx)| row[*idx].trim().to_string()).collect())
                .collect();

            let inconsistent_fields: Vec<String> = checked
                .iter()
                .enumerate()
                .filter(|(pos, _)| occurrences.iter().any(|occ| occ[*pos] != occurrences[0][*pos]))
                .map(|(_, (name, _))| name.to_string())
                .collect();

            if inconsistent_fields.is_empty() {
                continue;
            }

            entries.push(RegistryInconsistency {
                tax_id: tax_id.to_string(),
                total: occurrences.len(),
                occurrences,
                inconsistent_fields,
            });
        }

        if !entries.is_empty() {
            warn!(cnpjs = entries.len(), "inconsistent registry entries found");
        }

        Ok(InconsistencyReport {
            fields: checked.iter().map(|(name, _)| name.to_string()).collect(),
            entries,
        })
    }
}

impl Default for RegistryJoiner {
    fn default() -> Self {
        Self::new()
    }
}
