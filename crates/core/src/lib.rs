//! # tabulookup-core
//!
//! Configurable filter-and-lookup engine over registered tabular datasets.
//!
//! This crate provides:
//! - The dataset store and its schema cache
//! - Per-sheet filter/result column configuration
//! - The exact-match query executor and its audit trail
//! - Analytics over the audit trail
//! - [`LookupService`], the facade used by the server and the CLI
//!
//! ```no_run
//! use tabulookup_core::{Filters, LookupService};
//!
//! # async fn run() -> tabulookup_core::LookupResult<()> {
//! let service = LookupService::in_memory();
//! let dataset = service.register("prices", "", "prices.xlsx").await?;
//!
//! let mut filters = Filters::new();
//! filters.insert("category".to_string(), "A".to_string());
//! let response = service.query(dataset.id, "Sales", &filters, None).await?;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

/// Read-only summaries over the audit trail.
pub mod analytics;
/// Query audit sinks and logger.
pub mod audit;
/// Error types and result aliases.
pub mod error;
/// Exact-match row lookup.
pub mod executor;
/// Dataset, configuration and query log records.
pub mod model;
/// File access behind datasets.
pub mod reader;
/// Parsed-sheet cache.
pub mod row_cache;
/// Sheet and column metadata.
pub mod schema;
/// Runtime settings.
pub mod settings;
/// Caller-facing operations.
pub mod service;
/// Per-sheet configuration.
pub mod sheet_config;
/// Dataset registry.
pub mod store;
/// Result values and coercion.
pub mod value;

pub use analytics::{AnalyticsSummary, DatasetUsage};
pub use audit::{AuditLogger, AuditSink, JsonlAuditLog, MemoryAuditLog};
pub use error::{LookupError, LookupResult};
pub use executor::{evaluate, QueryExecution, QueryExecutor};
pub use model::{
    Dataset, DatasetId, Filters, QueryLog, QueryOutcome, ResultRow, SheetConfiguration,
};
pub use reader::{FileReader, TabularReader};
pub use schema::SchemaCache;
pub use service::{
    parse_filters, FilterableColumns, LookupService, QueryResponse, SetConfigResponse,
    SheetList, FOUND_MESSAGE, NOT_FOUND_MESSAGE,
};
pub use settings::Settings;
pub use sheet_config::{SheetConfigStore, SheetConfigUpdate};
pub use store::DatasetStore;
pub use value::{ResultValue, TOTAL_COLUMN};
