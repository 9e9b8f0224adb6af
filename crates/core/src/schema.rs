//! Schema cache: sheet and column names derived once per dataset and stored
//! on the dataset record.

use crate::error::{LookupError, LookupResult};
use crate::model::{Dataset, DatasetId};
use crate::store::DatasetStore;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct SchemaCache {
    store: Arc<DatasetStore>,
}

impl SchemaCache {
    #[must_use]
    pub fn new(store: Arc<DatasetStore>) -> Self {
        Self { store }
    }

    /// Sheet names of a dataset, deriving them on first access.
    pub async fn get_sheets(&self, id: DatasetId) -> LookupResult<Vec<String>> {
        let dataset = self.store.get(id).await?;
        if !dataset.needs_metadata() {
            return Ok(dataset.sheet_names);
        }
        Ok(self.refresh(id).await?.sheet_names)
    }

    /// Column names of one sheet, deriving them when missing from the cache.
    pub async fn get_columns(&self, id: DatasetId, sheet: &str) -> LookupResult<Vec<String>> {
        let mut dataset = self.store.get(id).await?;
        if dataset.needs_metadata() {
            dataset = self.refresh(id).await?;
        }
        if let Some(columns) = dataset.column_info.get(sheet) {
            return Ok(columns.clone());
        }
        if !dataset.sheet_names.iter().any(|s| s == sheet) {
            return Err(LookupError::SheetNotFound(sheet.to_string()));
        }

        // Listed sheet without cached columns: read just this sheet.
        let columns = self.store.read_column_names(id, sheet).await?;
        let name = sheet.to_string();
        let cached = columns.clone();
        self.store
            .update(id, move |d| {
                d.column_info.insert(name, cached);
                Ok(())
            })
            .await?;
        Ok(columns)
    }

    /// Re-read the structure of the dataset's file and store it.
    pub async fn refresh(&self, id: DatasetId) -> LookupResult<Dataset> {
        let structure = self.store.read_structure(id).await?;
        let dataset = self
            .store
            .update(id, move |d| {
                d.sheet_names = structure.keys().cloned().collect();
                d.column_info = structure;
                d.refresh_enabled_sheets();
                Ok(d.clone())
            })
            .await?;
        info!(
            dataset = %id,
            sheets = dataset.sheet_names.len(),
            "derived dataset schema"
        );
        Ok(dataset)
    }
}
