use crate::cell::CellValue;
use crate::error::{Result, SheetError};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A sheet representing a 2D grid of cells (row-major storage).
///
/// Once a header row has been promoted with [`Sheet::promote_header_row`],
/// `data` only holds the body rows and columns are addressable by name.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    data: Vec<Vec<CellValue>>,
    column_names: Option<Vec<String>>,
    column_index: Option<HashMap<String, usize>>,
}

impl Sheet {
    /// Create a new empty sheet
    #[must_use]
    pub fn new() -> Self {
        Self::with_name("Sheet1")
    }

    /// Create a new empty sheet with a name
    #[must_use]
    pub fn with_name(name: &str) -> Self {
        Sheet {
            name: name.to_string(),
            data: Vec::new(),
            column_names: None,
            column_index: None,
        }
    }

    /// Create a sheet from a 2D vector of values
    #[must_use]
    pub fn from_data<T: Into<CellValue>>(data: Vec<Vec<T>>) -> Self {
        let mut sheet = Self::new();
        sheet.data = data
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        sheet
    }

    /// Create a named-column sheet from a header and body rows
    #[must_use]
    pub fn from_columns<T: Into<CellValue>>(columns: &[&str], rows: Vec<Vec<T>>) -> Self {
        let mut sheet = Self::from_data(rows);
        sheet.set_column_names(columns.iter().map(|c| (*c).to_string()).collect());
        sheet
    }

    /// Get the sheet name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sheet name
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Number of rows in `data` (the header is not counted once promoted)
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    /// Number of columns, taken from the header when present
    #[must_use]
    pub fn col_count(&self) -> usize {
        match &self.column_names {
            Some(names) => names.len(),
            None => self.data.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a cell by position
    pub fn get(&self, row: usize, col: usize) -> Result<&CellValue> {
        let cells = self.row(row)?;
        cells.get(col).ok_or(SheetError::ColumnIndexOutOfBounds {
            index: col,
            count: cells.len(),
        })
    }

    /// Get a row by index
    pub fn row(&self, index: usize) -> Result<&Vec<CellValue>> {
        self.data.get(index).ok_or(SheetError::RowIndexOutOfBounds {
            index,
            count: self.data.len(),
        })
    }

    /// Iterate over rows in source order
    pub fn rows(&self) -> impl Iterator<Item = &Vec<CellValue>> {
        self.data.iter()
    }

    #[must_use]
    pub fn data(&self) -> &Vec<Vec<CellValue>> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<Vec<CellValue>> {
        &mut self.data
    }

    // ===== Named Access =====

    /// Remove the first row and use it as column names.
    ///
    /// Header cells are normalized the way dataframe readers do it: empty
    /// cells become `Unnamed: <index>` and repeated names get a `.<n>`
    /// suffix, so every column name is unique.
    pub fn promote_header_row(&mut self) -> Result<()> {
        if self.data.is_empty() {
            return Err(SheetError::RowIndexOutOfBounds { index: 0, count: 0 });
        }
        let header = self.data.remove(0);
        self.set_column_names(header_names(&header));
        Ok(())
    }

    fn set_column_names(&mut self, names: Vec<String>) {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        self.column_names = Some(names);
        self.column_index = Some(index);
    }

    /// Get column names (if set)
    #[must_use]
    pub fn column_names(&self) -> Option<&Vec<String>> {
        self.column_names.as_ref()
    }

    /// Get the column index by name
    pub fn column_position(&self, name: &str) -> Result<usize> {
        self.column_index
            .as_ref()
            .ok_or_else(|| {
                SheetError::ColumnsNotNamed("Call promote_header_row() first".to_string())
            })?
            .get(name)
            .copied()
            .ok_or_else(|| SheetError::ColumnNotFound {
                name: name.to_string(),
            })
    }

    /// Distinct non-empty values of a column in their canonical string form,
    /// sorted ascending.
    pub fn distinct_strings(&self, name: &str) -> Result<Vec<String>> {
        let col = self.column_position(name)?;
        let values: BTreeSet<String> = self
            .data
            .iter()
            .filter_map(|row| row.get(col))
            .filter(|cell| !cell.is_null())
            .map(CellValue::as_str)
            .collect();
        Ok(values.into_iter().collect())
    }

}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

fn header_names(header: &[CellValue]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(header.len());
    let mut repeats: HashMap<String, usize> = HashMap::new();

    header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = if cell.is_null() {
                format!("Unnamed: {i}")
            } else {
                cell.as_str()
            };
            let mut name = base.clone();
            while taken.contains(&name) {
                let n = repeats.entry(base.clone()).or_insert(0);
                *n += 1;
                name = format!("{base}.{n}");
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}
