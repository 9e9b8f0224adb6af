//! Transport-safe result values and the coercion rules that produce them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tabulookup_sheet::CellValue;

/// Name of the column that is always projected first when present.
pub const TOTAL_COLUMN: &str = "total";

/// A projected result value: `number | string | null` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
}

impl ResultValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerce the value of the `total` column: any parseable number becomes a
    /// float, everything else (including empty cells) becomes null.
    #[must_use]
    pub fn total(cell: &CellValue) -> Self {
        cell.as_float().map_or(Self::Null, Self::Float)
    }

    /// Coerce a non-total result cell, keeping integers and floats apart.
    #[must_use]
    pub fn cell(cell: &CellValue) -> Self {
        match cell {
            CellValue::Null => Self::Null,
            CellValue::Int(i) => Self::Int(*i),
            CellValue::Float(f) if f.is_nan() => Self::Null,
            CellValue::Float(f) => Self::Float(*f),
            other => Self::String(other.as_str()),
        }
    }

    /// Coerce a cell according to the column it was projected from.
    #[must_use]
    pub fn project(column: &str, cell: &CellValue) -> Self {
        if column == TOTAL_COLUMN {
            Self::total(cell)
        } else {
            Self::cell(cell)
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}
