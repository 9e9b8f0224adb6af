//! Error types for tabulookup.

use crate::model::DatasetId;
use tabulookup_sheet::SheetError;
use thiserror::Error;

/// Result type for lookup operations.
pub type LookupResult<T> = Result<T, LookupError>;

/// Errors returned by the lookup engine.
///
/// None of these are fatal to the process; every variant is reported to the
/// caller of the failing request.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The underlying tabular file could not be opened or parsed.
    #[error("Error reading dataset {dataset}: {message}")]
    SourceUnreadable { dataset: DatasetId, message: String },

    /// No dataset with this id is registered.
    #[error("Dataset not found: {0}")]
    DatasetNotFound(DatasetId),

    /// The dataset exists but has been deactivated by an administrator.
    #[error("Dataset is not active: {0}")]
    DatasetInactive(DatasetId),

    /// The workbook has no sheet with this name.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// The sheet is configured as disabled.
    #[error("Selected sheet is not enabled")]
    SheetDisabled(String),

    /// A column named by the caller does not exist in the sheet.
    #[error("Column not found in sheet {sheet}: {column}")]
    ColumnNotFound { sheet: String, column: String },

    /// A configuration write was based on a stale version.
    #[error("Configuration of dataset {dataset} changed (expected version {expected}, found {actual})")]
    ConfigurationConflict {
        dataset: DatasetId,
        expected: u64,
        actual: u64,
    },

    /// A dataset with this display name already exists.
    #[error("File name already exists: {0}")]
    DuplicateName(String),

    /// The file extension is not an accepted spreadsheet format.
    #[error("Invalid file type '{0}'")]
    UnsupportedFormat(String),

    /// The file exceeds the configured upload limit.
    #[error("File size too large: {size} bytes (maximum {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    /// Malformed request input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The query did not finish within the configured deadline.
    #[error("Query timed out after {0} ms")]
    Timeout(u128),

    /// Saving or loading engine state failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LookupError {
    /// Wrap a reader failure for the given dataset, mapping a missing sheet
    /// to [`LookupError::SheetNotFound`].
    pub fn from_sheet(dataset: DatasetId, err: SheetError) -> Self {
        match err {
            SheetError::SheetNotFound { name } => Self::SheetNotFound(name),
            other => Self::SourceUnreadable {
                dataset,
                message: other.to_string(),
            },
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl std::fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }
}

impl From<tokio::task::JoinError> for LookupError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking read failed: {err}"))
    }
}
