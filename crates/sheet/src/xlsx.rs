use crate::book::Book;
use crate::cell::CellValue;
use crate::error::{Result, SheetError};
use crate::sheet::Sheet;
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::path::Path;

/// Options for reading spreadsheet files (xlsx, xlsm, xls, ods)
#[derive(Debug, Clone, Default)]
pub struct XlsxReadOptions {
    /// Whether the first row contains headers
    pub has_headers: bool,
}

impl XlsxReadOptions {
    /// Set whether the first row contains headers
    #[must_use]
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }
}

/// Canonical text of a date cell, e.g. `2024-01-15 00:00:00`
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert calamine Data to CellValue.
///
/// Spreadsheets store every number as a float; whole numbers that fit an
/// `i64` are read back as integers. Dates become their canonical text.
fn data_to_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => float_to_cell_value(*f),
        Data::String(s) => CellValue::String(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if dt.is_datetime() => {
                CellValue::String(value.format(DATETIME_FORMAT).to_string())
            }
            // durations and out-of-range serials keep the raw number
            _ => float_to_cell_value(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::String(format!("#ERROR: {e:?}")),
    }
}

fn float_to_cell_value(f: f64) -> CellValue {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        CellValue::Int(f as i64)
    } else {
        CellValue::Float(f)
    }
}

impl Sheet {
    /// Load a specific sheet from a spreadsheet file by name
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, the sheet is missing, or
    /// the workbook cannot be parsed.
    pub fn from_excel_sheet<P: AsRef<Path>>(
        path: P,
        sheet_name: &str,
        options: XlsxReadOptions,
    ) -> Result<Self> {
        let mut workbook = open_workbook_auto(path.as_ref()).map_err(SheetError::workbook)?;

        if !workbook.sheet_names().iter().any(|name| name == sheet_name) {
            return Err(SheetError::SheetNotFound {
                name: sheet_name.to_string(),
            });
        }

        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(SheetError::workbook)?;

        let mut sheet = Sheet::with_name(sheet_name);
        *sheet.data_mut() = range
            .rows()
            .map(|row| row.iter().map(data_to_cell_value).collect())
            .collect();

        if options.has_headers && sheet.row_count() > 0 {
            sheet.promote_header_row()?;
        }

        Ok(sheet)
    }

    /// Save the sheet to an Excel file. Named columns are written as the
    /// header row.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be created or written.
    pub fn save_as_xlsx<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(self.name()).map_err(SheetError::workbook)?;
        self.write_to_worksheet(worksheet)?;
        workbook.save(path.as_ref()).map_err(SheetError::workbook)?;
        Ok(())
    }

    fn write_to_worksheet(&self, worksheet: &mut Worksheet) -> Result<()> {
        let mut rows: Vec<Vec<CellValue>> = Vec::with_capacity(self.row_count() + 1);
        if let Some(names) = self.column_names() {
            rows.push(names.iter().map(|n| CellValue::from(n.as_str())).collect());
        }
        rows.extend(self.data().iter().cloned());

        for (row_idx, row) in rows.iter().enumerate() {
            let row_num = u32::try_from(row_idx)
                .map_err(|_| SheetError::Workbook("Row index overflow".to_string()))?;
            for (col_idx, cell) in row.iter().enumerate() {
                let col_num = u16::try_from(col_idx)
                    .map_err(|_| SheetError::Workbook("Column index overflow".to_string()))?;

                match cell {
                    CellValue::Null => {}
                    CellValue::Bool(b) => {
                        worksheet
                            .write_boolean(row_num, col_num, *b)
                            .map_err(SheetError::workbook)?;
                    }
                    // Note: Excel stores all numbers as f64, so integers > 2^53 may lose precision
                    CellValue::Int(i) => {
                        worksheet
                            .write_number(row_num, col_num, *i as f64)
                            .map_err(SheetError::workbook)?;
                    }
                    CellValue::Float(f) => {
                        worksheet
                            .write_number(row_num, col_num, *f)
                            .map_err(SheetError::workbook)?;
                    }
                    CellValue::String(s) => {
                        worksheet
                            .write_string(row_num, col_num, s)
                            .map_err(SheetError::workbook)?;
                    }
                }
            }
        }

        Ok(())
    }
}

impl Book {
    /// Get sheet names from a spreadsheet file without loading cell data
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened.
    pub fn excel_sheet_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let workbook = open_workbook_auto(path.as_ref()).map_err(SheetError::workbook)?;
        Ok(workbook.sheet_names())
    }

    /// Save the book to an Excel file, one worksheet per sheet
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be created or written.
    pub fn save_as_xlsx<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut workbook = Workbook::new();

        for (name, sheet) in self.sheets() {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name).map_err(SheetError::workbook)?;
            sheet.write_to_worksheet(worksheet)?;
        }

        workbook.save(path.as_ref()).map_err(SheetError::workbook)?;
        Ok(())
    }
}
