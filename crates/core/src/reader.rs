//! Structural and row access to the files behind datasets.
//!
//! All methods block on file I/O; async callers run them through
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use tabulookup_sheet::{Book, CsvOptions, Result, Sheet, SheetError, XlsxReadOptions};

/// Read contract for tabular files.
pub trait TabularReader: Send + Sync {
    /// Sheet names in file order.
    fn sheet_names(&self, path: &Path) -> Result<Vec<String>>;

    /// Column names of one sheet, taken from its header row.
    fn column_names(&self, path: &Path, sheet: &str) -> Result<Vec<String>> {
        let sheet = self.read_sheet(path, sheet)?;
        Ok(sheet.column_names().cloned().unwrap_or_default())
    }

    /// All body rows of one sheet, with named columns.
    fn read_sheet(&self, path: &Path, sheet: &str) -> Result<Sheet>;
}

/// Reads spreadsheet workbooks and CSV files from disk.
///
/// A CSV file is a workbook with a single sheet named after the file stem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReader;

impl FileReader {
    fn is_csv(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }

    fn csv_sheet_name(path: &Path) -> Result<String> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| SheetError::UnsupportedFormat(path.display().to_string()))
    }
}

impl TabularReader for FileReader {
    fn sheet_names(&self, path: &Path) -> Result<Vec<String>> {
        if Self::is_csv(path) {
            // Opening the file surfaces missing or unreadable sources early
            std::fs::File::open(path)?;
            return Ok(vec![Self::csv_sheet_name(path)?]);
        }
        Book::excel_sheet_names(path)
    }

    fn read_sheet(&self, path: &Path, sheet: &str) -> Result<Sheet> {
        if Self::is_csv(path) {
            if Self::csv_sheet_name(path)? != sheet {
                return Err(SheetError::SheetNotFound {
                    name: sheet.to_string(),
                });
            }
            return Sheet::from_csv(path, CsvOptions::default().with_headers(true));
        }
        Sheet::from_excel_sheet(path, sheet, XlsxReadOptions::default().with_headers(true))
    }
}
