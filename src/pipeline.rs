// 🚀 Pipeline - filings + registry → consolidated reports
//
// extract → correlate (per filing) → consolidate → write → enrich → write
//
// Per-filing failures, filings without a reporting period and recoverable
// failures of the registry stages are logged and recorded in the manifest;
// only errors that `PipelineError::is_fatal` marks stop the run.

use crate::config::PipelineConfig;
use crate::consolidator::{Consolidation, Consolidator};
use crate::correlator::{merge_orphans, CorrelatedRecord, Correlator, OrphanEntry, Period};
use crate::db;
use crate::discovery::FilingSource;
use crate::error::{PipelineError, Result};
use crate::extractor::ExpenseExtractor;
use crate::joiner::{EnrichedRecord, InconsistencyReport, RegistryJoiner};
use crate::manifest::RunManifest;
use crate::report::ReportWriter;
use crate::table::Table;
use rusqlite::Connection;
use std::path::Path;
use tracing::{error, info, warn};

/// Everything a run produced, in memory
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub manifest: RunManifest,
    pub consolidation: Consolidation,
    pub enriched: Vec<EnrichedRecord>,
    pub inconsistencies: InconsistencyReport,
    pub orphans: Vec<OrphanEntry>,
}

/// Records accumulated over all filings of a run
#[derive(Debug, Clone, Default)]
pub struct Accumulated {
    pub records: Vec<CorrelatedRecord>,
    pub orphans: Vec<OrphanEntry>,
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: ExpenseExtractor,
    correlator: Correlator,
    consolidator: Consolidator,
    joiner: RegistryJoiner,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline {
            extractor: ExpenseExtractor::from_config(&config),
            correlator: Correlator::with_columns(config.columns.clone()),
            consolidator: Consolidator::new(),
            joiner: RegistryJoiner::with_columns(config.columns.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full run: load the registry once, process every filing, write outputs
    pub fn run(&self, registry_path: &Path, filings: &[FilingSource]) -> Result<RunSummary> {
        let registry = Table::from_path(registry_path)?;
        info!(
            rows = registry.len(),
            columns = ?registry.headers,
            "registry loaded"
        );
        self.run_with_registry(&registry, filings)
    }

    pub fn run_with_registry(&self, registry: &Table, filings: &[FilingSource]) -> Result<RunSummary> {
        let mut manifest = RunManifest::start();
        manifest.registry_rows = registry.len();

        let accumulated = self.process_filings(registry, filings, &mut manifest)?;
        self.process_records(registry, accumulated, manifest)
    }

    /// Extract and correlate each filing in order; recoverable failures skip the filing
    pub fn process_filings(&self, registry: &Table, filings: &[FilingSource], manifest: &mut RunManifest) -> Result<Accumulated> {
        let mut accumulated = Accumulated::default();

        for filing in filings {
            info!(file = %filing.path.display(), quarter = ?filing.quarter, year = ?filing.year, "processing filing");

            let period = match (filing.quarter, filing.year) {
                (Some(quarter), Some(year)) => Period::new(quarter, year),
                _ => {
                    warn!(file = %filing.path.display(), "skipping filing without reporting period");
                    manifest.skip(&filing.path, "no reporting period (expected a tag like 1T2024 in the path)");
                    continue;
                }
            };

            let expenses = match self.extractor.extract(&filing.path) {
                Ok(expenses) => expenses,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(file = %filing.path.display(), "skipping filing: {}", err);
                    manifest.skip(&filing.path, &err);
                    continue;
                }
            };

            let correlation = self.correlator.correlate_detailed(&expenses, registry, period);

            if correlation.records.is_empty() {
                warn!(file = %filing.path.display(), "no correlated records");
            } else {
                info!(
                    file = %filing.path.display(),
                    records = correlation.records.len(),
                    "filing correlated"
                );
            }

            manifest.files_processed.push(filing.path.clone());
            accumulated.records.extend(correlation.records);
            accumulated.orphans.extend(correlation.orphans);
        }

        Ok(accumulated)
    }

    /// Consolidate, enrich and write every report
    pub fn process_records(&self, registry: &Table, accumulated: Accumulated, mut manifest: RunManifest) -> Result<RunSummary> {
        let writer = ReportWriter::new(&self.config.output.dir, &self.config.output.base_name);
        let orphans = merge_orphans(accumulated.orphans);

        manifest.counts.correlated = accumulated.records.len();
        manifest.counts.orphan_ids = orphans.len();

        let consolidation = self.consolidator.consolidate(&accumulated.records).map_err(|err| {
            error!("consolidation aborted: {}", err);
            err
        })?;

        manifest.counts.invalid_identifiers = consolidation.invalid.len();
        manifest.counts.consolidated = consolidation.records.len();
        manifest.counts.conflicts = consolidation.conflicts.len();

        manifest.outputs.push(writer.write_consolidated(&consolidation.records)?);
        manifest.outputs.push(writer.write_invalid(&consolidation.invalid)?);
        manifest.outputs.push(writer.write_conflicts(&consolidation.conflicts)?);
        manifest.outputs.push(writer.write_variability(&consolidation.variability)?);
        if self.config.write_orphans {
            manifest.outputs.push(writer.write_orphans(&orphans)?);
        }

        let enriched = match self.joiner.enrich(&consolidation.records, registry) {
            Ok(enriched) => {
                manifest.counts.enriched = enriched.len();
                manifest.outputs.push(writer.write_enriched(&enriched)?);
                if let Some(sqlite_path) = &self.config.sqlite_path {
                    self.store(sqlite_path, &manifest.run_id, &enriched)?;
                }
                enriched
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("skipping registry enrichment: {}", err);
                manifest.skip_stage("registry enrichment", &err);
                Vec::new()
            }
        };

        let inconsistencies = match self.joiner.report_inconsistencies(registry) {
            Ok(inconsistencies) => {
                manifest.counts.registry_inconsistencies = inconsistencies.entries.len();
                manifest.outputs.push(writer.write_inconsistencies(&inconsistencies)?);
                inconsistencies
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("skipping registry inconsistency report: {}", err);
                manifest.skip_stage("registry inconsistencies", &err);
                InconsistencyReport::default()
            }
        };

        manifest.finish();
        manifest.write(&writer.path_for("_manifest", "json"))?;

        info!(
            run_id = %manifest.run_id,
            consolidated = manifest.counts.consolidated,
            skipped = manifest.files_skipped.len(),
            stages_skipped = manifest.stages_skipped.len(),
            "run finished"
        );

        Ok(RunSummary {
            manifest,
            consolidation,
            enriched,
            inconsistencies,
            orphans,
        })
    }

    fn store(&self, sqlite_path: &Path, run_id: &str, enriched: &[EnrichedRecord]) -> Result<()> {
        let conn = Connection::open(sqlite_path)?;
        db::setup_database(&conn)?;
        db::store_enriched(&conn, run_id, enriched)?;

        let stored = db::verify_count(&conn, run_id)?;
        if stored != enriched.len() as i64 {
            return Err(PipelineError::JoinCardinality {
                expected: enriched.len(),
                actual: stored as usize,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, DEFAULT_CATEGORY};
    use tempfile::TempDir;

    fn registry() -> Table {
        Table::new(
            vec![
                "REGISTRO_OPERADORA".to_string(),
                "CNPJ".to_string(),
                "Razao_Social".to_string(),
                "Modalidade".to_string(),
                "UF".to_string(),
            ],
            vec![
                vec!["111", "11222333000181", "Alpha Saúde", "Autogestão", "SP"],
                vec!["222", "11222333000182", "Beta Ltda", "Seguradora", "RJ"],
            ]
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect(),
        )
    }

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            output: OutputConfig {
                dir: dir.path().join("out"),
                base_name: "consolidado".to_string(),
            },
            ..PipelineConfig::default()
        }
    }

    fn write_filing(dir: &TempDir, name: &str, rows: &[(&str, &str, &str)]) -> std::path::PathBuf {
        let mut content = String::from("DATA;REG_ANS;DESCRICAO;VL_SALDO_INICIAL;VL_SALDO_FINAL\n");
        for (reg, open, close) in rows {
            content.push_str(&format!("2024-01-01;{};{};{};{}\n", reg, DEFAULT_CATEGORY, open, close));
        }
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_bad_filing_is_skipped() {
        let dir = TempDir::new().unwrap();
        let good = write_filing(&dir, "1T2024.csv", &[("111", "0", "10")]);
        let bad = dir.path().join("1T2024.pdf");
        std::fs::write(&bad, "x").unwrap();

        let pipeline = Pipeline::new(config(&dir));
        let filings = vec![FilingSource::new(bad, Some(1), Some(2024)), FilingSource::new(good, Some(1), Some(2024))];
        let summary = pipeline.run_with_registry(&registry(), &filings).unwrap();

        assert_eq!(summary.manifest.files_skipped.len(), 1);
        assert_eq!(summary.manifest.files_processed.len(), 1);
        assert_eq!(summary.consolidation.records.len(), 1);
    }

    #[test]
    fn test_invalid_cnpj_goes_to_side_report() {
        let dir = TempDir::new().unwrap();
        let filing = write_filing(&dir, "2T2024.csv", &[("111", "0", "10"), ("222", "0", "5")]);

        let pipeline = Pipeline::new(config(&dir));
        let summary = pipeline
            .run_with_registry(&registry(), &[FilingSource::new(filing, Some(2), Some(2024))])
            .unwrap();

        assert_eq!(summary.consolidation.records.len(), 1);
        assert_eq!(summary.consolidation.invalid.len(), 1);
        assert_eq!(summary.consolidation.invalid[0].registry_id, "222");
        assert_eq!(summary.enriched.len(), 1);
        assert_eq!(summary.enriched[0].registry_number, "111");
    }

    #[test]
    fn test_untagged_filing_is_skipped() {
        let dir = TempDir::new().unwrap();
        let tagged = write_filing(&dir, "1T2024.csv", &[("111", "0", "10")]);
        let leftover = write_filing(&dir, "leftover.csv", &[("111", "0", "99")]);

        let pipeline = Pipeline::new(config(&dir));
        let filings = vec![
            FilingSource::new(tagged, Some(1), Some(2024)),
            FilingSource::new(leftover.clone(), None, None),
        ];
        let summary = pipeline.run_with_registry(&registry(), &filings).unwrap();

        assert_eq!(summary.manifest.files_processed.len(), 1);
        assert_eq!(summary.manifest.files_skipped.len(), 1);
        assert_eq!(summary.manifest.files_skipped[0].path, leftover);
        assert_eq!(summary.consolidation.records.len(), 1);
        assert_eq!(summary.consolidation.records[0].total, Some(rust_decimal::Decimal::from(10)));
    }

    #[test]
    fn test_records_without_period_are_fatal() {
        let dir = TempDir::new().unwrap();
        let accumulated = Accumulated {
            records: vec![CorrelatedRecord {
                registry_id: "111".to_string(),
                tax_id: "11222333000181".to_string(),
                legal_name: "Alpha Saúde".to_string(),
                expense: Some(rust_decimal::Decimal::from(10)),
                quarter: None,
                year: None,
            }],
            orphans: Vec::new(),
        };

        let pipeline = Pipeline::new(config(&dir));
        let err = pipeline
            .process_records(&registry(), accumulated, RunManifest::start())
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::ConsolidationSchema { .. }));
    }

    #[test]
    fn test_orphans_merged_across_filings() {
        let dir = TempDir::new().unwrap();
        let a = write_filing(&dir, "a.csv", &[("999", "0", "1")]);
        let b = write_filing(&dir, "b.csv", &[("999", "0", "2"), ("111", "0", "10")]);

        let pipeline = Pipeline::new(config(&dir));
        let filings = vec![
            FilingSource::new(a, Some(1), Some(2024)),
            FilingSource::new(b, Some(1), Some(2024)),
        ];
        let summary = pipeline.run_with_registry(&registry(), &filings).unwrap();

        assert_eq!(summary.orphans.len(), 1);
        assert_eq!(summary.orphans[0].rows, 2);
        assert_eq!(summary.manifest.counts.orphan_ids, 1);

        let report = std::fs::read_to_string(dir.path().join("out").join("consolidado_sem_registro.csv")).unwrap();
        assert_eq!(report, "\u{feff}REG_ANS;Trimestre;Ano;Linhas\n999;1;2024;2\n");
    }

    #[test]
    fn test_roster_without_attributes_skips_registry_stages() {
        let dir = TempDir::new().unwrap();
        let filing = write_filing(&dir, "1T2024.csv", &[("111", "0", "10")]);
        let roster = Table::new(
            vec!["REGISTRO_OPERADORA".to_string(), "CNPJ".to_string(), "Razao_Social".to_string()],
            vec![vec!["111".to_string(), "11222333000181".to_string(), "Alpha Saúde".to_string()]],
        );

        let pipeline = Pipeline::new(config(&dir));
        let summary = pipeline
            .run_with_registry(&roster, &[FilingSource::new(filing, Some(1), Some(2024))])
            .unwrap();

        let out = dir.path().join("out");
        assert!(out.join("consolidado.csv").exists());
        assert!(out.join("consolidado_manifest.json").exists());
        assert!(!out.join("consolidado_com_operadoras.csv").exists());
        assert!(!out.join("consolidado_inconsistencias_operadoras.csv").exists());

        assert_eq!(summary.consolidation.records.len(), 1);
        assert!(summary.enriched.is_empty());
        assert!(summary.inconsistencies.is_empty());
        let stages: Vec<&str> = summary.manifest.stages_skipped.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, vec!["registry enrichment", "registry inconsistencies"]);
        assert!(summary.manifest.stages_skipped[0].reason.contains("Modalidade"));
    }

    #[test]
    fn test_sqlite_export() {
        let dir = TempDir::new().unwrap();
        let filing = write_filing(&dir, "3T2024.csv", &[("111", "0", "10")]);

        let mut cfg = config(&dir);
        cfg.sqlite_path = Some(dir.path().join("expenses.db"));
        let pipeline = Pipeline::new(cfg);
        let summary = pipeline
            .run_with_registry(&registry(), &[FilingSource::new(filing, Some(3), Some(2024))])
            .unwrap();

        let conn = Connection::open(dir.path().join("expenses.db")).unwrap();
        assert_eq!(db::verify_count(&conn, &summary.manifest.run_id).unwrap(), 1);
    }
}
