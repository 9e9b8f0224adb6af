//! The lookup service: caller-facing operations over the engine components.

use crate::analytics::{self, AnalyticsSummary};
use crate::audit::{AuditLogger, JsonlAuditLog};
use crate::error::{LookupError, LookupResult};
use crate::executor::QueryExecutor;
use crate::model::{Dataset, DatasetId, Filters, QueryLog, ResultRow, SheetConfiguration};
use crate::schema::SchemaCache;
use crate::settings::Settings;
use crate::sheet_config::{SheetConfigStore, SheetConfigUpdate};
use crate::store::DatasetStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const FOUND_MESSAGE: &str = "Results found successfully!";
pub const NOT_FOUND_MESSAGE: &str = "No results found for the selected filters.";

/// Enabled sheets of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetList {
    pub sheets: Vec<String>,
    pub dataset_name: String,
}

/// Filter columns with their selectable values, plus the result columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterableColumns {
    pub columns: IndexMap<String, Vec<String>>,
    pub result_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub found: bool,
    pub results: Option<ResultRow>,
    pub message: String,
    pub applied_filters: Filters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetConfigResponse {
    pub enabled_sheets: Vec<String>,
}

/// Convert JSON filter values to their string form.
///
/// Strings are kept verbatim, numbers and booleans use their JSON text and
/// `null` becomes the empty (ignored) filter.
pub fn parse_filters(raw: IndexMap<String, serde_json::Value>) -> LookupResult<Filters> {
    raw.into_iter()
        .map(|(column, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(LookupError::InvalidInput(format!(
                        "filter '{column}' must be a scalar, got {other}"
                    )))
                }
            };
            Ok((column, value))
        })
        .collect()
}

/// Lookup engine facade.
#[derive(Clone)]
pub struct LookupService {
    settings: Arc<Settings>,
    store: Arc<DatasetStore>,
    schema: SchemaCache,
    configs: SheetConfigStore,
    executor: QueryExecutor,
    audit: AuditLogger,
}

impl LookupService {
    /// Build a service from settings, opening persisted state when a state
    /// directory is configured.
    pub async fn from_settings(settings: Settings) -> LookupResult<Self> {
        let mut store = DatasetStore::new();
        if settings.row_cache {
            store = store.with_row_cache();
        }

        let audit = match &settings.state_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(LookupError::persistence)?;
                if let Some(path) = settings.datasets_path() {
                    store = store.persisted(path).await?;
                }
                match settings.audit_path() {
                    Some(path) => AuditLogger::new(Arc::new(JsonlAuditLog::new(path))),
                    None => AuditLogger::in_memory(),
                }
            }
            None => AuditLogger::in_memory(),
        };

        Ok(Self::with_parts(settings, store, audit))
    }

    /// Build a service from already constructed parts.
    #[must_use]
    pub fn with_parts(settings: Settings, store: DatasetStore, audit: AuditLogger) -> Self {
        let store = Arc::new(store);
        let schema = SchemaCache::new(Arc::clone(&store));
        let configs = SheetConfigStore::new(Arc::clone(&store), schema.clone());
        let executor = QueryExecutor::new(
            Arc::clone(&store),
            configs.clone(),
            audit.clone(),
            settings.query_timeout(),
        );
        Self {
            settings: Arc::new(settings),
            store,
            schema,
            configs,
            executor,
            audit,
        }
    }

    /// In-memory service with default settings.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_parts(Settings::default(), DatasetStore::new(), AuditLogger::in_memory())
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    async fn active_dataset(&self, id: DatasetId) -> LookupResult<Dataset> {
        let dataset = self.store.get(id).await?;
        if !dataset.active {
            return Err(LookupError::DatasetInactive(id));
        }
        Ok(dataset)
    }

    // ===== Caller operations =====

    /// Sheets a caller may query.
    pub async fn list_enabled_sheets(&self, id: DatasetId) -> LookupResult<SheetList> {
        let dataset = self.active_dataset(id).await?;
        let sheets = self.configs.list_enabled_sheets(id).await?;
        Ok(SheetList {
            sheets,
            dataset_name: dataset.name,
        })
    }

    /// Selectable values of each configured filter column.
    pub async fn filterable_columns(&self, id: DatasetId, sheet: &str) -> LookupResult<FilterableColumns> {
        self.active_dataset(id).await?;
        let config = self.configs.get_config(id, sheet).await?;
        if !config.enabled {
            return Err(LookupError::SheetDisabled(sheet.to_string()));
        }

        let rows = self.store.read_sheet_rows(id, sheet).await?;
        let mut columns = IndexMap::with_capacity(config.filter_columns.len());
        for column in &config.filter_columns {
            let values = rows
                .distinct_strings(column)
                .map_err(|_| LookupError::ColumnNotFound {
                    sheet: sheet.to_string(),
                    column: column.clone(),
                })?;
            columns.insert(column.clone(), values);
        }

        Ok(FilterableColumns {
            columns,
            result_columns: config.result_columns,
        })
    }

    /// Look up one row. Reading and matching are bounded by the configured
    /// query timeout.
    pub async fn query(
        &self,
        id: DatasetId,
        sheet: &str,
        filters: &Filters,
        user: Option<&str>,
    ) -> LookupResult<QueryResponse> {
        let execution = self.executor.execute(id, sheet, filters, user).await?;

        let message = if execution.outcome.found {
            FOUND_MESSAGE
        } else {
            NOT_FOUND_MESSAGE
        };
        Ok(QueryResponse {
            found: execution.outcome.found,
            results: execution.outcome.results,
            message: message.to_string(),
            applied_filters: execution.applied_filters,
        })
    }

    /// Replace one sheet's configuration.
    pub async fn set_sheet_config(
        &self,
        id: DatasetId,
        sheet: &str,
        update: SheetConfigUpdate,
    ) -> LookupResult<SetConfigResponse> {
        let enabled_sheets = self.configs.set_config(id, sheet, update).await?;
        Ok(SetConfigResponse { enabled_sheets })
    }

    pub async fn sheet_config(&self, id: DatasetId, sheet: &str) -> LookupResult<SheetConfiguration> {
        self.configs.get_config(id, sheet).await
    }

    // ===== Administration =====

    async fn check_source(&self, id: DatasetId, path: &Path) -> LookupResult<()> {
        if !self.settings.accepts(path) {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();
            return Err(LookupError::UnsupportedFormat(ext));
        }
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| LookupError::SourceUnreadable {
                dataset: id,
                message: format!("{}: {e}", path.display()),
            })?
            .len();
        if size > self.settings.max_upload_bytes {
            return Err(LookupError::FileTooLarge {
                size,
                max: self.settings.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Register a file as a new dataset and derive its sheet metadata.
    ///
    /// Nothing is stored when the file cannot be read.
    pub async fn register(
        &self,
        name: &str,
        description: &str,
        path: impl Into<PathBuf>,
    ) -> LookupResult<Dataset> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LookupError::InvalidInput("dataset name is required".to_string()));
        }
        let dataset = Dataset::new(name, description, path.into());
        self.check_source(dataset.id, &dataset.source).await?;

        let id = self.store.insert(dataset).await?.id;
        match self.schema.refresh(id).await {
            Ok(dataset) => Ok(dataset),
            Err(e) => {
                if let Err(rollback) = self.store.remove(id).await {
                    warn!(dataset = %id, error = %rollback, "failed to roll back registration");
                }
                Err(e)
            }
        }
    }

    pub async fn set_active(&self, id: DatasetId, active: bool) -> LookupResult<Dataset> {
        let dataset = self
            .store
            .update(id, |d| {
                d.active = active;
                Ok(d.clone())
            })
            .await?;
        info!(dataset = %id, active, "dataset status changed");
        Ok(dataset)
    }

    pub async fn toggle_active(&self, id: DatasetId) -> LookupResult<Dataset> {
        let dataset = self
            .store
            .update(id, |d| {
                d.active = !d.active;
                Ok(d.clone())
            })
            .await?;
        info!(dataset = %id, active = dataset.active, "dataset status changed");
        Ok(dataset)
    }

    /// Point a dataset at a new file, keeping its configuration.
    pub async fn replace_source(&self, id: DatasetId, path: impl Into<PathBuf>) -> LookupResult<Dataset> {
        let path = path.into();
        self.check_source(id, &path).await?;

        let previous = self
            .store
            .update(id, |d| Ok(std::mem::replace(&mut d.source, path)))
            .await?;
        self.store.invalidate_rows(id).await;

        match self.schema.refresh(id).await {
            Ok(dataset) => {
                info!(dataset = %id, source = %dataset.source.display(), "dataset source replaced");
                Ok(dataset)
            }
            Err(e) => {
                let reverted = self
                    .store
                    .update(id, |d| {
                        d.source = previous;
                        Ok(())
                    })
                    .await;
                if let Err(revert) = reverted {
                    warn!(dataset = %id, error = %revert, "failed to restore previous source");
                }
                Err(e)
            }
        }
    }

    /// Delete a dataset with its audit records, optionally removing its file.
    pub async fn delete(&self, id: DatasetId, remove_file: bool) -> LookupResult<Dataset> {
        let dataset = self.store.remove(id).await?;
        match self.audit.purge_dataset(id).await {
            Ok(purged) => info!(dataset = %id, purged, "purged query logs"),
            Err(e) => warn!(dataset = %id, error = %e, "failed to purge query logs"),
        }
        if remove_file {
            if let Err(e) = tokio::fs::remove_file(&dataset.source).await {
                warn!(dataset = %id, path = %dataset.source.display(), error = %e, "failed to remove dataset file");
            }
        }
        Ok(dataset)
    }

    pub async fn dataset(&self, id: DatasetId) -> LookupResult<Dataset> {
        self.store.get(id).await
    }

    /// All datasets, newest first.
    pub async fn datasets(&self) -> Vec<Dataset> {
        self.store.list().await
    }

    /// Re-derive sheet metadata from the dataset's file.
    pub async fn refresh(&self, id: DatasetId) -> LookupResult<Dataset> {
        self.store.invalidate_rows(id).await;
        self.schema.refresh(id).await
    }

    // ===== Analytics =====

    pub async fn analytics(&self) -> LookupResult<AnalyticsSummary> {
        let entries = self.audit.entries().await?;
        let datasets = self.store.list().await;
        Ok(analytics::summarize(&entries, &datasets))
    }

    /// Most recent query logs, newest first.
    pub async fn recent_queries(&self, limit: usize) -> LookupResult<Vec<QueryLog>> {
        self.audit.recent(limit).await
    }
}
