// 📝 Report Writer - Excel-friendly CSV outputs
//
// All reports: ';' delimiter, ',' decimal separator, UTF-8 with BOM.
// The header row is always written, even when there are no data rows.

use crate::consolidator::{ConflictEntry, ConsolidatedRecord, InvalidIdentifierEntry, VariabilityEntry};
use crate::correlator::OrphanEntry;
use crate::error::Result;
use crate::joiner::{EnrichedRecord, InconsistencyReport, INCONSISTENT_TAG};
use crate::manifest::OutputFile;
use crate::money::format_optional;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const BOM: &[u8] = "\u{feff}".as_bytes();

pub const CONSOLIDATED_HEADER: [&str; 6] = [
    "CNPJ",
    "RazaoSocial",
    "Trimestre",
    "Ano",
    "ValorDespesas",
    "MediaTrimestral",
];

// ============================================================================
// REPORT WRITER
// ============================================================================

pub struct ReportWriter {
    dir: PathBuf,
    base_name: String,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, base_name: &str) -> Self {
        ReportWriter {
            dir: dir.into(),
            base_name: base_name.to_string(),
        }
    }

    /// `<dir>/<base><suffix>.<extension>`
    pub fn path_for(&self, suffix: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}{}.{}", self.base_name, suffix, extension))
    }

    fn write_csv(&self, suffix: &str, header: &[String], rows: Vec<Vec<String>>) -> Result<OutputFile> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(suffix, "csv");
        let row_count = rows.len();
        write_semicolon_csv(&path, header, rows)?;
        info!(path = %path.display(), rows = row_count, "report written");
        OutputFile::from_written(&path, row_count)
    }

    pub fn write_consolidated(&self, records: &[ConsolidatedRecord]) -> Result<OutputFile> {
        let rows = records.iter().map(consolidated_cells).collect();
        self.write_csv("", &owned(&CONSOLIDATED_HEADER), rows)
    }

    pub fn write_invalid(&self, entries: &[InvalidIdentifierEntry]) -> Result<OutputFile> {
        let rows = entries
            .iter()
            .map(|e| vec![e.tax_id.clone(), e.registry_id.clone(), e.legal_name.clone()])
            .collect();
        self.write_csv("_cnpjs_invalidos", &owned(&["CNPJ", "REG_ANS", "RazaoSocial"]), rows)
    }

    pub fn write_conflicts(&self, entries: &[ConflictEntry]) -> Result<OutputFile> {
        let header = owned(&[
            "CNPJ",
            "RazaoSocial1",
            "RazaoSocial2",
            "Trimestre",
            "Ano",
            "ValorDespesas1",
            "ValorDespesas2",
        ]);
        let rows = entries
            .iter()
            .map(|c| {
                vec![
                    c.tax_id.clone(),
                    c.legal_name_1.clone(),
                    c.legal_name_2.clone(),
                    optional_to_string(c.quarter),
                    optional_to_string(c.year),
                    format_optional(c.expense_1),
                    format_optional(c.expense_2),
                ]
            })
            .collect();
        self.write_csv("_cnpjs_duplicados", &header, rows)
    }

    pub fn write_variability(&self, entries: &[VariabilityEntry]) -> Result<OutputFile> {
        let rows = entries
            .iter()
            .map(|v| vec![v.tax_id.clone(), v.legal_name.clone(), format_optional(v.std_dev)])
            .collect();
        self.write_csv("_desvio_padrao", &owned(&["CNPJ", "RazaoSocial", "DesvioPadrao"]), rows)
    }

    pub fn write_inconsistencies(&self, report: &InconsistencyReport) -> Result<OutputFile> {
        let occurrences = report.max_occurrences();

        let mut header = vec!["CNPJ".to_string()];
        for n in 1..=occurrences {
            for field in &report.fields {
                header.push(format!("{}_Registro{}", field, n));
            }
        }
        header.push("Colunas_Inconsistentes".to_string());
        header.push("Total_Registros".to_string());

        let rows = report
            .entries
            .iter()
            .map(|entry| {
                let mut row = vec![entry.tax_id.clone()];
                for n in 0..occurrences {
                    for (pos, field) in report.fields.iter().enumerate() {
                        let cell = match entry.occurrences.get(n) {
                            Some(values) if entry.is_inconsistent(field) => {
                                format!("{} {}", values[pos], INCONSISTENT_TAG)
                            }
                            Some(values) => values[pos].clone(),
                            None => String::new(),
                        };
                        row.push(cell);
                    }
                }
                row.push(entry.inconsistent_fields.join(", "));
                row.push(entry.total.to_string());
                row
            })
            .collect();

        self.write_csv("_inconsistencias_operadoras", &header, rows)
    }

    pub fn write_enriched(&self, records: &[EnrichedRecord]) -> Result<OutputFile> {
        let mut header = owned(&CONSOLIDATED_HEADER);
        header.extend(owned(&["RegistroANS", "Modalidade", "UF"]));

        let rows = records
            .iter()
            .map(|e| {
                let mut row = consolidated_cells(&e.record);
                row.push(e.registry_number.clone());
                row.push(e.category.clone());
                row.push(e.region.clone());
                row
            })
            .collect();
        self.write_csv("_com_operadoras", &header, rows)
    }

    pub fn write_orphans(&self, entries: &[OrphanEntry]) -> Result<OutputFile> {
        let rows = entries
            .iter()
            .map(|o| {
                vec![
                    o.registry_id.clone(),
                    optional_to_string(o.quarter),
                    optional_to_string(o.year),
                    o.rows.to_string(),
                ]
            })
            .collect();
        self.write_csv("_sem_registro", &owned(&["REG_ANS", "Trimestre", "Ano", "Linhas"]), rows)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn optional_to_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn consolidated_cells(r: &ConsolidatedRecord) -> Vec<String> {
    vec![
        r.tax_id.clone(),
        r.legal_name.clone(),
        r.quarter.to_string(),
        r.year.to_string(),
        format_optional(r.total),
        format_optional(r.mean),
    ]
}

/// Write a BOM-prefixed, ';'-delimited CSV file
pub fn write_semicolon_csv(path: &Path, header: &[String], rows: Vec<Vec<String>>) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(BOM)?;

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(file);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
