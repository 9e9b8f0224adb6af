//! Per-sheet configuration: enabled flag, filter columns and result columns.

use crate::error::{LookupError, LookupResult};
use crate::model::{DatasetId, SheetConfiguration};
use crate::schema::SchemaCache;
use crate::store::DatasetStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A whole-sheet configuration write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfigUpdate {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub filter_columns: Vec<String>,
    #[serde(default)]
    pub result_columns: Vec<String>,
    /// Dataset version the caller last saw; the write is rejected when the
    /// dataset has moved on since.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

fn enabled_by_default() -> bool {
    true
}

impl SheetConfigUpdate {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            filter_columns: Vec::new(),
            result_columns: Vec::new(),
            expected_version: None,
        }
    }

    #[must_use]
    pub fn with_filters<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.filter_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_results<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.result_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Clone)]
pub struct SheetConfigStore {
    store: Arc<DatasetStore>,
    schema: SchemaCache,
}

impl SheetConfigStore {
    #[must_use]
    pub fn new(store: Arc<DatasetStore>, schema: SchemaCache) -> Self {
        Self { store, schema }
    }

    /// Stored configuration of a sheet, or the default one.
    pub async fn get_config(&self, id: DatasetId, sheet: &str) -> LookupResult<SheetConfiguration> {
        let columns = self.schema.get_columns(id, sheet).await?;
        let dataset = self.store.get(id).await?;
        Ok(dataset
            .sheet_config
            .get(sheet)
            .cloned()
            .unwrap_or_else(|| SheetConfiguration::default_for(&columns)))
    }

    /// Replace a sheet's configuration and return the enabled sheets.
    pub async fn set_config(
        &self,
        id: DatasetId,
        sheet: &str,
        update: SheetConfigUpdate,
    ) -> LookupResult<Vec<String>> {
        // Columns are resolved before the dataset's write lock is taken
        let columns = self.schema.get_columns(id, sheet).await?;
        let config = SheetConfiguration::validated(
            update.enabled,
            &update.filter_columns,
            &update.result_columns,
            &columns,
        );
        let enabled = config.enabled;
        let expected_version = update.expected_version;
        let name = sheet.to_string();
        let enabled_sheets = self
            .store
            .update(id, move |d| {
                if let Some(expected) = expected_version {
                    if d.version != expected {
                        return Err(LookupError::ConfigurationConflict {
                            dataset: d.id,
                            expected,
                            actual: d.version,
                        });
                    }
                }
                d.sheet_config.insert(name, config);
                d.refresh_enabled_sheets();
                Ok(d.enabled_sheets.clone())
            })
            .await?;

        info!(
            dataset = %id,
            sheet,
            enabled,
            "updated sheet configuration"
        );
        Ok(enabled_sheets)
    }

    /// Sheets of the dataset whose configuration is enabled, in file order.
    pub async fn list_enabled_sheets(&self, id: DatasetId) -> LookupResult<Vec<String>> {
        let sheets = self.schema.get_sheets(id).await?;
        let dataset = self.store.get(id).await?;
        Ok(sheets
            .into_iter()
            .filter(|sheet| dataset.is_sheet_enabled(sheet))
            .collect())
    }
}
