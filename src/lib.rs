// Filing Consolidation - Core Library
// Correlates quarterly regulator filings with the registry of operators and
// produces consolidated expense reports plus data-quality side reports.

pub mod error;
pub mod money;
pub mod identifier;     // CNPJ check digits
pub mod table;
pub mod schema;         // column resolution by candidate names
pub mod config;
pub mod discovery;
pub mod extractor;
pub mod correlator;
pub mod consolidator;
pub mod joiner;
pub mod report;
pub mod manifest;
pub mod db;
pub mod pipeline;
pub mod logging;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use identifier::{digits_only, is_valid_cnpj};
pub use money::{format_decimal_comma, parse_amount, round2};
pub use table::{Columns, Table};
pub use schema::{resolve_column, ColumnCandidates};
pub use config::{CategoryFilter, FilterMode, OutputConfig, PipelineConfig};
pub use discovery::{discover_filings, parse_period, FilingSource};
pub use extractor::{ExpenseExtractor, ExpenseRow, ExpenseTable, FileFormat};
pub use correlator::{merge_orphans, CorrelatedRecord, Correlation, Correlator, OrphanEntry, Period};
pub use consolidator::{
    ConflictEntry, ConsolidatedRecord, Consolidation, Consolidator,
    InvalidIdentifierEntry, VariabilityEntry,
};
pub use joiner::{
    EnrichedRecord, InconsistencyReport, RegistryInconsistency, RegistryJoiner,
    NO_REGISTRY_MATCH,
};
pub use report::ReportWriter;
pub use manifest::{OutputFile, RunManifest, SkippedStage, StageCounts};
pub use pipeline::{Pipeline, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
