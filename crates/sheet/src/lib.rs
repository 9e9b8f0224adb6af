//! Tabular data access for tabulookup
//!
//! Reads spreadsheet workbooks (xlsx, xlsm, xls, ods) and CSV files into
//! named-column sheets, and writes xlsx workbooks.
//!
//! # Examples
//!
//! ## Building a sheet with named columns
//!
//! ```
//! use tabulookup_sheet::{CellValue, Sheet};
//!
//! let sheet = Sheet::from_columns(
//!     &["category", "total"],
//!     vec![
//!         vec![CellValue::from("A"), CellValue::Int(100)],
//!         vec![CellValue::from("B"), CellValue::Int(200)],
//!     ],
//! );
//!
//! assert_eq!(sheet.row_count(), 2);
//! assert_eq!(sheet.distinct_strings("category").unwrap(), vec!["A", "B"]);
//! ```
//!
//! ## Loading a worksheet
//!
//! ```no_run
//! use tabulookup_sheet::{Book, Sheet, XlsxReadOptions};
//!
//! let names = Book::excel_sheet_names("data.xlsx").unwrap();
//! let sheet = Sheet::from_excel_sheet(
//!     "data.xlsx",
//!     &names[0],
//!     XlsxReadOptions::default().with_headers(true),
//! )
//! .unwrap();
//! ```

mod book;
mod cell;
mod csv;
mod error;
mod sheet;
mod xlsx;

/// Re-export book type.
pub use book::Book;
/// Re-export cell value type.
pub use cell::CellValue;
/// Re-export CSV options.
pub use csv::CsvOptions;
/// Re-export sheet error types.
pub use error::{Result, SheetError};
/// Re-export sheet type.
pub use sheet::Sheet;
/// Re-export spreadsheet read options.
pub use xlsx::XlsxReadOptions;
