// 🧮 Run Manifest - what a run read, skipped and wrote
//
// Every output carries a SHA-256 so two runs over the same inputs can be
// compared byte for byte.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub rows: usize,
    pub sha256: String,
}

impl OutputFile {
    /// Fingerprint a file that was just written
    pub fn from_written(path: &Path, rows: usize) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(OutputFile {
            path: path.to_path_buf(),
            rows,
            sha256: sha256_hex(&bytes),
        })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// A run stage that could not produce its output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStage {
    pub stage: String,
    pub reason: String,
}

/// Record counts at each stage boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub correlated: usize,
    pub orphan_ids: usize,
    pub invalid_identifiers: usize,
    pub consolidated: usize,
    pub conflicts: usize,
    pub registry_inconsistencies: usize,
    pub enriched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub registry_rows: usize,
    pub files_processed: Vec<PathBuf>,
    pub files_skipped: Vec<SkippedFile>,
    #[serde(default)]
    pub stages_skipped: Vec<SkippedStage>,
    pub counts: StageCounts,
    pub outputs: Vec<OutputFile>,
}

impl RunManifest {
    pub fn start() -> Self {
        RunManifest {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            registry_rows: 0,
            files_processed: Vec::new(),
            files_skipped: Vec::new(),
            stages_skipped: Vec::new(),
            counts: StageCounts::default(),
            outputs: Vec::new(),
        }
    }

    pub fn skip(&mut self, path: &Path, reason: impl ToString) {
        self.files_skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }

    pub fn skip_stage(&mut self, stage: &str, reason: impl ToString) {
        self.stages_skipped.push(SkippedStage {
            stage: stage.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
