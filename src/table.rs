// 📋 Table - raw string tables loaded from CSV/TXT/XLSX
//
// Every cell stays a string; typing happens in the stage that needs it.

use crate::error::{PipelineError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

// ============================================================================
// COLUMNS SEAM
// ============================================================================

/// Anything with named columns can be resolved against candidate lists
pub trait Columns {
    fn columns(&self) -> &[String];

    fn has_column(&self, name: &str) -> bool {
        self.columns().iter().any(|c| c == name)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c == name)
    }
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Columns for Table {
    fn columns(&self) -> &[String] {
        &self.headers
    }
}

impl Table {
    /// Build a table, normalizing headers and padding ragged rows
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| clean_header(h)).collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Table { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Load any supported file, picking the parser from the extension
    pub fn from_path(path: &Path) -> Result<Table> {
        match extension_of(path).as_deref() {
            Some("csv") => Table::from_delimited_sniffed(path),
            Some("txt") | Some("tsv") => Table::from_delimited(path, b'\t'),
            Some("xlsx") | Some("xls") | Some("xlsm") | Some("ods") => Table::from_spreadsheet(path),
            _ => Err(PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Delimited text with a known delimiter
    pub fn from_delimited(path: &Path, delimiter: u8) -> Result<Table> {
        let content = read_text(path)?;
        parse_delimited(&content, delimiter).map_err(|e| PipelineError::FileRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Delimited text, delimiter detected from the first lines (';' or ',')
    pub fn from_delimited_sniffed(path: &Path) -> Result<Table> {
        let content = read_text(path)?;
        let delimiter = sniff_delimiter(&content);
        parse_delimited(&content, delimiter).map_err(|e| PipelineError::FileRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// First worksheet of a spreadsheet; first row is the header
    pub fn from_spreadsheet(path: &Path) -> Result<Table> {
        let mut workbook = open_workbook_auto(path)?;

        let sheet_names = workbook.sheet_names();
        let first = sheet_names.first().ok_or_else(|| PipelineError::FileRead {
            path: path.to_path_buf(),
            message: "spreadsheet contains no sheets".to_string(),
        })?;

        let range = workbook.worksheet_range(first)?;
        let mut rows = range.rows();

        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row.iter().map(cell_to_string).collect(),
            None => {
                return Err(PipelineError::FileRead {
                    path: path.to_path_buf(),
                    message: format!("sheet '{}' is empty", first),
                })
            }
        };

        let data: Vec<Vec<String>> = rows
            .map(|row| row.iter().map(cell_to_string).collect())
            .filter(|row: &Vec<String>| row.iter().any(|c| !c.is_empty()))
            .collect();

        Ok(Table::new(headers, data))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

/// Read a text file as UTF-8, falling back to Windows-1252 (Latin-1 superset)
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Pick ';' or ',' by which one gives a consistent multi-field split
fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    let mut best = b';';
    let mut best_score = 0usize;

    for &delim in &[b';', b','] {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let target = match counts.first() {
            Some(&c) if c > 1 => c,
            _ => continue,
        };
        let consistent = counts.iter().filter(|&&c| c == target).count();
        let score = consistent * target;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn parse_delimited(content: &str, delimiter: u8) -> std::result::Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }

    Ok(Table::new(headers, rows))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(n) => {
            // integral floats are ids or whole amounts: no ".0" suffix
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_semicolon_csv() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.csv", b"\"REG_ANS\";\"CNPJ\"\n\"111\";\"11222333000181\"\n");
        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.headers, vec!["REG_ANS", "CNPJ"]);
        assert_eq!(table.get(0, "CNPJ"), Some("11222333000181"));
    }

    #[test]
    fn test_comma_csv_is_sniffed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.csv", b"REG_ANS,VALOR\n111,\"1,5\"\n222,\"2,5\"\n");
        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.headers, vec!["REG_ANS", "VALOR"]);
        assert_eq!(table.get(1, "VALOR"), Some("2,5"));
    }

    #[test]
    fn test_tab_txt() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", b"REG_ANS\tDESCRICAO\n111\tX\n");
        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.get(0, "DESCRICAO"), Some("X"));
    }

    #[test]
    fn test_latin1_fallback() {
        let dir = TempDir::new().unwrap();
        // "Razão" in Latin-1: 0xE3 for 'ã'
        let path = write_file(&dir, "a.csv", b"NOME;UF\nRaz\xe3o;SP\n");
        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.get(0, "NOME"), Some("Razão"));
    }

    #[test]
    fn test_bom_and_ragged_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.csv", "\u{feff}A;B;C\n1;2\n".as_bytes());
        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.headers[0], "A");
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Table::from_path(Path::new("report.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_spreadsheet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "REG_ANS").unwrap();
        sheet.write_string(0, 1, "VL_SALDO_FINAL").unwrap();
        sheet.write_number(1, 0, 123456.0).unwrap();
        sheet.write_number(1, 1, 250.555).unwrap();
        workbook.save(&path).unwrap();

        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.get(0, "REG_ANS"), Some("123456"));
        assert_eq!(table.get(0, "VL_SALDO_FINAL"), Some("250.555"));
    }
}
