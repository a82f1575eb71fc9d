use csv::ReaderBuilder;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::models::Table;

const SPREADSHEET_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xls"];

/// Reads delimited text into a [`Table`] of strings. No value is coerced:
/// `NA`, `null` and empty cells all stay as written.
pub struct TableLoader {
    delimiter: u8,
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn load_file(&self, path: &Path) -> Result<Table> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            return Err(PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path)?;
        let content = decode_text(&bytes);
        let table = if extension == "tsv" {
            Self { delimiter: b'\t' }.parse_str(&content)?
        } else {
            self.parse_str(&content)?
        };
        if table.headers.is_empty() {
            return Err(PipelineError::MissingHeader {
                path: path.to_path_buf(),
            });
        }
        Ok(table)
    }

    pub fn parse_str(&self, content: &str) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Table::from_rows(headers, rows))
    }
}

/// UTF-8 when valid, otherwise Latin-1 (one code point per byte).
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_na_like_values_as_text() {
        let table = TableLoader::new()
            .parse_str("Account,Name\nNA,null\n,None\n")
            .unwrap();
        assert_eq!(table.headers, vec!["Account", "Name"]);
        assert_eq!(table.rows[0], vec!["NA", "null"]);
        assert_eq!(table.rows[1], vec!["", "None"]);
    }

    #[test]
    fn pads_short_rows_and_skips_blank_lines() {
        let table = TableLoader::new().parse_str("A,B,C\n1,2\n,,\n4,5,6\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn falls_back_to_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.csv");
        fs::write(&path, b"Acc#,Name\n1001,Jos\xe9\n").unwrap();
        let table = TableLoader::new().load_file(&path).unwrap();
        assert_eq!(table.rows[0][1], "Jos\u{e9}");
    }

    #[test]
    fn rejects_spreadsheets() {
        let err = TableLoader::new()
            .load_file(Path::new("inputs/Template.XLSM"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, b"").unwrap();
        let err = TableLoader::new().load_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MissingHeader { .. }));
    }

    #[test]
    fn tsv_extension_uses_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.tsv");
        fs::write(&path, "A\tB\nx,1\ty\n").unwrap();
        let table = TableLoader::new().load_file(&path).unwrap();
        assert_eq!(table.rows[0], vec!["x,1", "y"]);
    }
}
