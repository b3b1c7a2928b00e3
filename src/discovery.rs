// 🗂️ Filing Discovery - local filing files and their reporting period
//
// Quarterly archives are named like "1T2024.zip" and usually extract into
// a directory of the same name, so the period tag can sit on the file or on
// any parent directory below the search root.

use crate::error::Result;
use crate::extractor::FileFormat;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingSource {
    pub path: PathBuf,
    pub quarter: Option<u8>,
    pub year: Option<i32>,
}

impl FilingSource {
    pub fn new(path: impl Into<PathBuf>, quarter: Option<u8>, year: Option<i32>) -> Self {
        FilingSource {
            path: path.into(),
            quarter,
            year,
        }
    }
}

fn period_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([1-4])T(\d{4})").expect("static regex"))
}

/// Extract (quarter, year) from a name like "3T2024" or "3T2024.zip"
pub fn parse_period(name: &str) -> Option<(u8, i32)> {
    let caps = period_pattern().captures(name)?;
    let quarter = caps.get(1)?.as_str().parse().ok()?;
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((quarter, year))
}

/// Period from the file name first, then from its parent directories
fn infer_period(root: &Path, path: &Path) -> Option<(u8, i32)> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .rev()
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(parse_period)
}

/// Recursively list supported filing files under `dir`, sorted by path
pub fn discover_filings(dir: &Path) -> Result<Vec<FilingSource>> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let filings = files
        .into_iter()
        .filter(|p| FileFormat::from_path(p).is_some())
        .map(|p| {
            let period = infer_period(dir, &p);
            FilingSource {
                quarter: period.map(|(q, _)| q),
                year: period.map(|(_, y)| y),
                path: p,
            }
        })
        .collect();

    Ok(filings)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
