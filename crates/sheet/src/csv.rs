use crate::cell::CellValue;
use crate::error::Result;
use crate::sheet::Sheet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// CSV reader options. Field types are always inferred.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Whether the first row contains headers
    pub has_headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            has_headers: false,
        }
    }
}

impl CsvOptions {
    /// Set whether the first row contains headers
    #[must_use]
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }
}

impl Sheet {
    /// Load a sheet from a CSV file with custom options.
    ///
    /// The sheet is named after the file stem.
    pub fn from_csv<P: AsRef<Path>>(path: P, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut sheet = Self::from_csv_reader(BufReader::new(file), options)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            sheet.set_name(stem);
        }
        Ok(sheet)
    }

    /// Load a sheet from a CSV string with custom options
    pub fn from_csv_str(content: &str, options: CsvOptions) -> Result<Self> {
        Self::from_csv_reader(content.as_bytes(), options)
    }

    /// Load a sheet from a reader
    pub fn from_csv_reader<R: Read>(reader: R, options: CsvOptions) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false) // We handle headers ourselves
            .flexible(true)
            .from_reader(reader);

        let mut data: Vec<Vec<CellValue>> = Vec::new();

        for result in csv_reader.records() {
            let record = result?;
            data.push(record.iter().map(CellValue::parse).collect());
        }

        let mut sheet = Sheet::new();
        *sheet.data_mut() = data;

        if options.has_headers && sheet.row_count() > 0 {
            sheet.promote_header_row()?;
        }

        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_csv_with_headers() {
        let csv = "category,total\nA,100\nB,\n";
        let sheet = Sheet::from_csv_str(csv, CsvOptions::default().with_headers(true)).unwrap();

        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.column_position("total").unwrap(), 1);
        assert_eq!(sheet.get(0, 1).unwrap(), &CellValue::Int(100));
        assert_eq!(sheet.get(1, 1).unwrap(), &CellValue::Null);
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() {
        let sheet = Sheet::from_csv_str(
            "label,total\n\"a, b\",3.5\n",
            CsvOptions::default().with_headers(true),
        )
        .unwrap();
        assert_eq!(sheet.get(0, 0).unwrap(), &CellValue::from("a, b"));
        assert_eq!(sheet.get(0, 1).unwrap(), &CellValue::Float(3.5));
    }

    #[test]
    fn test_load_csv_file_named_after_stem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(&path, "item,price\npen,1.5\n").unwrap();

        let loaded = Sheet::from_csv(&path, CsvOptions::default().with_headers(true)).unwrap();
        assert_eq!(loaded.name(), "prices");
        assert_eq!(loaded.get(0, 1).unwrap(), &CellValue::Float(1.5));
    }
}
