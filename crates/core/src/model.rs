//! Domain records: datasets, sheet configuration, query outcomes and logs.

use crate::value::{ResultValue, TOTAL_COLUMN};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a registered dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(Uuid);

impl DatasetId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Filter values keyed by column name, in request order.
pub type Filters = IndexMap<String, String>;

/// Projected result columns keyed by column name, `total` first.
pub type ResultRow = IndexMap<String, ResultValue>;

/// Per-sheet query configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfiguration {
    pub enabled: bool,
    pub filter_columns: Vec<String>,
    pub result_columns: Vec<String>,
}

impl SheetConfiguration {
    /// Configuration used for a sheet nobody has configured yet.
    #[must_use]
    pub fn default_for(columns: &[String]) -> Self {
        let result_columns = if columns.iter().any(|c| c == TOTAL_COLUMN) {
            vec![TOTAL_COLUMN.to_string()]
        } else {
            Vec::new()
        };
        Self {
            enabled: true,
            filter_columns: Vec::new(),
            result_columns,
        }
    }

    /// Build a configuration whose column lists are validated against the
    /// sheet's live columns.
    ///
    /// Unknown and repeated names are dropped (first occurrence wins) and,
    /// when the sheet has a `total` column, it is moved or inserted to the
    /// front of the result columns.
    #[must_use]
    pub fn validated(
        enabled: bool,
        filter_columns: &[String],
        result_columns: &[String],
        columns: &[String],
    ) -> Self {
        let mut result_columns = retain_known(result_columns, columns);
        if columns.iter().any(|c| c == TOTAL_COLUMN) {
            result_columns.retain(|c| c != TOTAL_COLUMN);
            result_columns.insert(0, TOTAL_COLUMN.to_string());
        }

        Self {
            enabled,
            filter_columns: retain_known(filter_columns, columns),
            result_columns,
        }
    }
}

fn retain_known(requested: &[String], columns: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        if columns.contains(name) && !kept.contains(name) {
            kept.push(name.clone());
        }
    }
    kept
}

/// A registered tabular source and everything cached about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: PathBuf,
    pub active: bool,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sheet names in workbook order; empty until first derived.
    #[serde(default)]
    pub sheet_names: Vec<String>,
    /// Column names per sheet, in sheet order.
    #[serde(default)]
    pub column_info: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub sheet_config: IndexMap<String, SheetConfiguration>,
    /// Sheets whose configuration is enabled, in workbook order.
    #[serde(default)]
    pub enabled_sheets: Vec<String>,
    /// Incremented on every stored change.
    #[serde(default)]
    pub version: u64,
}

impl Dataset {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, source: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: DatasetId::new(),
            name: name.into(),
            description: description.into(),
            source,
            active: true,
            uploaded_at: now,
            updated_at: now,
            sheet_names: Vec::new(),
            column_info: IndexMap::new(),
            sheet_config: IndexMap::new(),
            enabled_sheets: Vec::new(),
            version: 0,
        }
    }

    /// Whether sheet metadata has to be (re)derived from the file.
    #[must_use]
    pub fn needs_metadata(&self) -> bool {
        self.sheet_names.is_empty()
    }

    /// Whether a sheet is enabled; unconfigured sheets are.
    #[must_use]
    pub fn is_sheet_enabled(&self, sheet: &str) -> bool {
        self.sheet_config.get(sheet).map_or(true, |c| c.enabled)
    }

    /// Recompute `enabled_sheets` from the sheet list and configuration.
    pub fn refresh_enabled_sheets(&mut self) {
        self.enabled_sheets = self
            .sheet_names
            .iter()
            .filter(|sheet| self.is_sheet_enabled(sheet))
            .cloned()
            .collect();
    }

    /// Record a stored change.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Outcome of one lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub found: bool,
    pub results: Option<ResultRow>,
}

impl QueryOutcome {
    #[must_use]
    pub fn found(results: ResultRow) -> Self {
        Self {
            found: true,
            results: Some(results),
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            found: false,
            results: None,
        }
    }
}

/// Immutable audit record of one query attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLog {
    pub id: Uuid,
    pub dataset_id: DatasetId,
    pub sheet_name: String,
    pub filters_applied: Filters,
    pub result_found: bool,
    pub result_data: Option<ResultRow>,
    pub query_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}
