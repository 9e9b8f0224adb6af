//! In-memory cache of parsed sheets keyed by (dataset, sheet).

use crate::model::DatasetId;
use std::collections::HashMap;
use std::sync::Arc;
use tabulookup_sheet::Sheet;
use tokio::sync::RwLock;
use tracing::debug;

/// Parsed sheets kept between queries so repeated lookups skip file I/O.
///
/// Entries are dropped whenever the dataset's file changes or the dataset is
/// deleted.
#[derive(Debug, Default)]
pub struct RowCache {
    sheets: RwLock<HashMap<(DatasetId, String), Arc<Sheet>>>,
}

impl RowCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, dataset: DatasetId, sheet: &str) -> Option<Arc<Sheet>> {
        let hit = self
            .sheets
            .read()
            .await
            .get(&(dataset, sheet.to_string()))
            .cloned();
        if hit.is_some() {
            debug!(%dataset, sheet, "row cache hit");
        }
        hit
    }

    pub async fn insert(&self, dataset: DatasetId, sheet: &str, rows: Arc<Sheet>) {
        self.sheets
            .write()
            .await
            .insert((dataset, sheet.to_string()), rows);
    }

    /// Drop every cached sheet of a dataset.
    pub async fn invalidate(&self, dataset: DatasetId) {
        let mut sheets = self.sheets.write().await;
        let before = sheets.len();
        sheets.retain(|(id, _), _| *id != dataset);
        debug!(%dataset, dropped = before - sheets.len(), "row cache invalidated");
    }

    pub async fn len(&self) -> usize {
        self.sheets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
