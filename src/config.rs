// ⚙️ Pipeline Configuration - config.toml with defaults for every field

use crate::discovery::FilingSource;
use crate::error::{PipelineError, Result};
use crate::schema::ColumnCandidates;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The line-item category the expense figures are computed for
pub const DEFAULT_CATEGORY: &str = "Despesas com Eventos / Sinistros";

// ============================================================================
// CATEGORY FILTER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Keep only rows whose description equals the category
    Include,
    /// Keep every row except those whose description equals the category
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryFilter {
    pub description: String,
    pub mode: FilterMode,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        CategoryFilter {
            description: DEFAULT_CATEGORY.to_string(),
            mode: FilterMode::Include,
        }
    }
}

impl CategoryFilter {
    pub fn include(description: &str) -> Self {
        CategoryFilter {
            description: description.to_string(),
            mode: FilterMode::Include,
        }
    }

    pub fn exclude(description: &str) -> Self {
        CategoryFilter {
            description: description.to_string(),
            mode: FilterMode::Exclude,
        }
    }

    /// Exact match on the (trimmed) description cell
    pub fn accepts(&self, description: &str) -> bool {
        let matches = description.trim() == self.description;
        match self.mode {
            FilterMode::Include => matches,
            FilterMode::Exclude => !matches,
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// File stem shared by every report (`<base>.csv`, `<base>_cnpjs_invalidos.csv`, ...)
    pub base_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: PathBuf::from("dados_consolidados"),
            base_name: "demonstracoes_contabeis_consolidadas".to_string(),
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub category_filter: CategoryFilter,
    pub columns: ColumnCandidates,
    pub output: OutputConfig,
    /// Also store the enriched table in SQLite
    pub sqlite_path: Option<PathBuf>,
    /// Write the report of filing rows with no registry match
    pub write_orphans: bool,
    /// Explicit filing list; used when no filings directory is given
    pub filings: Vec<FilingSource>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            category_filter: CategoryFilter::default(),
            columns: ColumnCandidates::default(),
            output: OutputConfig::default(),
            sqlite_path: None,
            write_orphans: true,
            filings: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_include() {
        let filter = CategoryFilter::include("Despesas com Eventos / Sinistros");
        assert!(filter.accepts("Despesas com Eventos / Sinistros"));
        assert!(filter.accepts("  Despesas com Eventos / Sinistros "));
        assert!(!filter.accepts("Despesas Administrativas"));
    }

    #[test]
    fn test_filter_exclude() {
        let filter = CategoryFilter::exclude("Despesas com Eventos / Sinistros");
        assert!(!filter.accepts("Despesas com Eventos / Sinistros"));
        assert!(filter.accepts("Despesas Administrativas"));
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.category_filter.mode, FilterMode::Include);
        assert_eq!(config.category_filter.description, DEFAULT_CATEGORY);
        assert!(config.write_orphans);
        assert!(config.sqlite_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            sqlite_path = "out.db"

            [category_filter]
            mode = "exclude"

            [output]
            base_name = "q3"

            [columns]
            tax_id = ["NR_CNPJ"]

            [[filings]]
            path = "3T2024/3T2024.csv"
            quarter = 3
            year = 2024
            "#,
        )
        .unwrap();

        assert_eq!(config.category_filter.mode, FilterMode::Exclude);
        assert_eq!(config.category_filter.description, DEFAULT_CATEGORY);
        assert_eq!(config.output.base_name, "q3");
        assert_eq!(config.output.dir, PathBuf::from("dados_consolidados"));
        assert_eq!(config.columns.tax_id, vec!["NR_CNPJ"]);
        assert_eq!(config.columns.region, ColumnCandidates::default().region);
        assert_eq!(config.sqlite_path, Some(PathBuf::from("out.db")));
        assert_eq!(config.filings.len(), 1);
        assert_eq!(config.filings[0].quarter, Some(3));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = PipelineConfig::from_toml("category_filter = 3").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
