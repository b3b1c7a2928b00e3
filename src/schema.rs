// 📐 Schema Resolver - find the real column name for a logical field
//
// Filings from different periods name the same field differently
// (REG_ANS, REGISTRO_OPERADORA, CD_REGISTRO_ANS, ...). Candidates are tried
// in priority order; the first one present wins.

use crate::table::Columns;
use serde::{Deserialize, Serialize};

/// First candidate (in order) that exists as a column, or `None`
pub fn resolve_column<'a, T, S>(table: &'a T, candidates: &[S]) -> Option<&'a str>
where
    T: Columns + ?Sized,
    S: AsRef<str>,
{
    candidates.iter().find_map(|candidate| {
        table
            .columns()
            .iter()
            .find(|c| c.as_str() == candidate.as_ref())
            .map(|c| c.as_str())
    })
}

// ============================================================================
// CANDIDATE LISTS
// ============================================================================

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Ordered candidate names for every logical field the pipeline reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnCandidates {
    /// Registry id as it appears in filings
    pub expense_registry_id: Vec<String>,
    /// Registry id as it appears in the registry roster
    pub registry_id: Vec<String>,
    pub tax_id: Vec<String>,
    pub legal_name: Vec<String>,
    /// Registry number copied into the enriched output
    pub registry_number: Vec<String>,
    pub category: Vec<String>,
    pub region: Vec<String>,
    pub description: Vec<String>,
    pub opening_balance: Vec<String>,
    pub closing_balance: Vec<String>,
}

impl Default for ColumnCandidates {
    fn default() -> Self {
        ColumnCandidates {
            expense_registry_id: names(&[
                "REGISTRO_OPERADORA",
                "REG_ANS",
                "CD_REGISTRO_ANS",
                "REGISTRO_ANS",
                "CD_REG_ANS",
            ]),
            registry_id: names(&["REG_ANS", "REGISTRO_ANS", "CD_REGISTRO_ANS", "REGISTRO_OPERADORA"]),
            tax_id: names(&["CNPJ", "CD_CNPJ"]),
            legal_name: names(&["Razao_Social", "NM_RAZAO_SOCIAL", "RazaoSocial"]),
            registry_number: names(&["REGISTRO_OPERADORA", "REG_ANS", "REGISTRO_ANS", "CD_REGISTRO_ANS"]),
            category: names(&["Modalidade", "MODALIDADE", "DS_MODALIDADE"]),
            region: names(&["UF", "SG_UF"]),
            description: names(&["DESCRICAO", "DS_CONTA"]),
            opening_balance: names(&["VL_SALDO_INICIAL"]),
            closing_balance: names(&["VL_SALDO_FINAL"]),
        }
    }
}
