use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use filing_consolidation::{
    discover_filings, is_valid_cnpj, logging, Pipeline, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "filing-consolidation", version, about = "Consolidate quarterly expense filings against the operator registry")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full consolidation over local filing files
    Run {
        /// Registry (operators roster) CSV
        #[arg(long)]
        registry: PathBuf,

        /// Directory with extracted filings (period read from names like 1T2024)
        #[arg(long)]
        filings: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides the configured output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Check CNPJ check digits
    Validate {
        #[arg(required = true)]
        cnpjs: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            registry,
            filings,
            config,
            output_dir,
        } => run(registry, filings, config, output_dir),
        Command::Validate { cnpjs } => {
            for cnpj in cnpjs {
                let status = if is_valid_cnpj(&cnpj) { "valid" } else { "INVALID" };
                println!("{}\t{}", cnpj, status);
            }
            Ok(())
        }
    }
}

fn run(
    registry: PathBuf,
    filings_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }

    let filings = match &filings_dir {
        Some(dir) => discover_filings(dir)
            .with_context(|| format!("Failed to list filings in {}", dir.display()))?,
        None => config.filings.clone(),
    };
    if filings.is_empty() {
        bail!("No filings to process: pass --filings <dir> or list [[filings]] in the config");
    }

    println!("📂 {} filing file(s), registry {}", filings.len(), registry.display());

    let pipeline = Pipeline::new(config);
    let summary = pipeline
        .run(&registry, &filings)
        .context("Consolidation run failed")?;

    let counts = &summary.manifest.counts;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Run {}", summary.manifest.run_id);
    println!("✓ Files processed: {}", summary.manifest.files_processed.len());
    for skipped in &summary.manifest.files_skipped {
        println!("⚠️  Skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    for stage in &summary.manifest.stages_skipped {
        println!("⚠️  Skipped stage {}: {}", stage.stage, stage.reason);
    }
    println!("✓ Correlated records: {}", counts.correlated);
    println!("✓ Consolidated rows: {}", counts.consolidated);
    println!("✓ Invalid CNPJs: {}", counts.invalid_identifiers);
    println!("✓ Name conflicts: {}", counts.conflicts);
    println!("✓ Registry inconsistencies: {}", counts.registry_inconsistencies);
    println!("✓ Registry ids without match: {}", counts.orphan_ids);
    for output in &summary.manifest.outputs {
        println!("   {} ({} rows)", output.path.display(), output.rows);
    }

    Ok(())
}
