// 🚨 Error Taxonomy - one error kind per failure class
// Format / schema / invariant / I/O, with the run policy decided in one place

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// File extension is not one of the supported filing formats
    #[error("unsupported file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// File exists but its structure could not be read
    #[error("failed to read {}: {message}", path.display())]
    FileRead { path: PathBuf, message: String },

    /// A required column is absent from a table
    #[error("{context}: missing column(s) {missing:?}; available columns: {available:?}")]
    Schema {
        context: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// A field required for grouping is absent from the accumulated records
    #[error("consolidation: missing field(s) {missing:?}; available fields: {available:?}")]
    ConsolidationSchema {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// Left join produced a different number of rows than its input
    #[error("join cardinality violated: expected {expected} rows, got {actual}")]
    JoinCardinality { expected: usize, actual: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error must halt the whole run.
    ///
    /// Per-filing problems (bad format, unreadable file, missing filing
    /// columns) only abort that filing. Consolidation schema errors, join
    /// invariant violations, configuration errors and output failures stop
    /// the run.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::UnsupportedFormat { .. }
            | PipelineError::FileRead { .. }
            | PipelineError::Schema { .. }
            | PipelineError::Spreadsheet(_) => false,
            PipelineError::ConsolidationSchema { .. }
            | PipelineError::JoinCardinality { .. }
            | PipelineError::Config(_)
            | PipelineError::Io(_)
            | PipelineError::Csv(_)
            | PipelineError::Storage(_)
            | PipelineError::Json(_) => true,
        }
    }

    pub fn schema(context: &str, missing: &[&str], available: &[String]) -> Self {
        PipelineError::Schema {
            context: context.to_string(),
            missing: missing.iter().map(|s| s.to_string()).collect(),
            available: available.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
