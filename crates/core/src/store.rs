//! Dataset store: the registry of datasets plus read access to their files.
//!
//! Every dataset sits behind its own `RwLock`, so writes to one dataset are
//! serialized while other datasets stay untouched. Writes are applied to a
//! copy, persisted, and only then swapped in, so a failed change or a failed
//! snapshot write leaves memory and disk on the previous state.

use crate::error::{LookupError, LookupResult};
use crate::model::{Dataset, DatasetId};
use crate::reader::{FileReader, TabularReader};
use crate::row_cache::RowCache;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabulookup_sheet::Sheet;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

type DatasetHandle = Arc<RwLock<Dataset>>;

/// Registry of datasets and reader of their tabular content.
pub struct DatasetStore {
    datasets: RwLock<IndexMap<DatasetId, DatasetHandle>>,
    reader: Arc<dyn TabularReader>,
    row_cache: Option<RowCache>,
    snapshot: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl DatasetStore {
    /// Create an in-memory store reading files from disk.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reader(Arc::new(FileReader))
    }

    #[must_use]
    pub fn with_reader(reader: Arc<dyn TabularReader>) -> Self {
        Self {
            datasets: RwLock::new(IndexMap::new()),
            reader,
            row_cache: None,
            snapshot: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Keep parsed sheets in memory between reads.
    #[must_use]
    pub fn with_row_cache(mut self) -> Self {
        self.row_cache = Some(RowCache::new());
        self
    }

    /// Persist the registry to `path` after every change, loading any
    /// existing snapshot first.
    pub async fn persisted(mut self, path: impl Into<PathBuf>) -> LookupResult<Self> {
        let path = path.into();
        if tokio::fs::try_exists(&path).await.map_err(LookupError::persistence)? {
            let bytes = tokio::fs::read(&path).await.map_err(LookupError::persistence)?;
            let datasets: Vec<Dataset> =
                serde_json::from_slice(&bytes).map_err(LookupError::persistence)?;
            info!(count = datasets.len(), path = %path.display(), "loaded dataset registry");
            let map = datasets
                .into_iter()
                .map(|d| (d.id, Arc::new(RwLock::new(d))))
                .collect();
            self.datasets = RwLock::new(map);
        }
        self.snapshot = Some(path);
        Ok(self)
    }

    #[must_use]
    pub fn row_cache(&self) -> Option<&RowCache> {
        self.row_cache.as_ref()
    }

    async fn handle(&self, id: DatasetId) -> LookupResult<DatasetHandle> {
        self.datasets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(LookupError::DatasetNotFound(id))
    }

    // ===== Registry =====

    /// Add a new dataset. Display names are unique.
    pub async fn insert(&self, dataset: Dataset) -> LookupResult<Dataset> {
        {
            let mut datasets = self.datasets.write().await;
            for handle in datasets.values() {
                if handle.read().await.name == dataset.name {
                    return Err(LookupError::DuplicateName(dataset.name));
                }
            }
            datasets.insert(dataset.id, Arc::new(RwLock::new(dataset.clone())));
        }
        if let Err(e) = self.persist().await {
            self.datasets.write().await.shift_remove(&dataset.id);
            return Err(e);
        }
        info!(dataset = %dataset.id, name = %dataset.name, "registered dataset");
        Ok(dataset)
    }

    /// Snapshot of one dataset.
    pub async fn get(&self, id: DatasetId) -> LookupResult<Dataset> {
        Ok(self.handle(id).await?.read().await.clone())
    }

    /// All datasets, most recently uploaded first.
    pub async fn list(&self) -> Vec<Dataset> {
        let handles: Vec<DatasetHandle> = self.datasets.read().await.values().cloned().collect();
        let mut datasets = Vec::with_capacity(handles.len());
        for handle in handles {
            datasets.push(handle.read().await.clone());
        }
        datasets.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        datasets
    }

    pub async fn is_active(&self, id: DatasetId) -> LookupResult<bool> {
        Ok(self.handle(id).await?.read().await.active)
    }

    /// Apply a change to one dataset under its write lock.
    ///
    /// `change` works on a copy; the copy replaces the stored record (with a
    /// bumped version) only when `change` succeeds and the snapshot holding
    /// it has been written.
    pub async fn update<T, F>(&self, id: DatasetId, change: F) -> LookupResult<T>
    where
        F: FnOnce(&mut Dataset) -> LookupResult<T>,
    {
        let handle = self.handle(id).await?;
        // Both taken before the dataset lock: `insert` reads dataset locks
        // while holding the registry lock
        let _persisting = match &self.snapshot {
            Some(_) => Some(self.persist_lock.lock().await),
            None => None,
        };
        let handles = self.handles().await;

        let mut stored = handle.write().await;
        let mut next = stored.clone();
        let value = change(&mut next)?;
        next.touch();
        self.write_snapshot(handles, Some(&next)).await?;
        *stored = next;
        Ok(value)
    }

    /// Remove a dataset and its cached rows.
    pub async fn remove(&self, id: DatasetId) -> LookupResult<Dataset> {
        let handle = self
            .datasets
            .write()
            .await
            .shift_remove(&id)
            .ok_or(LookupError::DatasetNotFound(id))?;
        if let Err(e) = self.persist().await {
            self.datasets.write().await.insert(id, handle);
            return Err(e);
        }
        if let Some(cache) = &self.row_cache {
            cache.invalidate(id).await;
        }
        let removed = handle.read().await.clone();
        info!(dataset = %id, name = %removed.name, "removed dataset");
        Ok(removed)
    }

    /// Drop cached rows after the dataset's file changed.
    pub async fn invalidate_rows(&self, id: DatasetId) {
        if let Some(cache) = &self.row_cache {
            cache.invalidate(id).await;
        }
    }

    async fn persist(&self) -> LookupResult<()> {
        if self.snapshot.is_none() {
            return Ok(());
        }
        // Serialize writers so the last snapshot on disk is the newest state
        let _guard = self.persist_lock.lock().await;
        let handles = self.handles().await;
        self.write_snapshot(handles, None).await
    }

    async fn handles(&self) -> Vec<(DatasetId, DatasetHandle)> {
        self.datasets
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }

    /// Write `handles` to the snapshot file, with `pending` standing in for
    /// the stored record of the same id. Callers hold `persist_lock`.
    async fn write_snapshot(
        &self,
        handles: Vec<(DatasetId, DatasetHandle)>,
        pending: Option<&Dataset>,
    ) -> LookupResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let mut datasets = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match pending {
                Some(dataset) if dataset.id == id => datasets.push(dataset.clone()),
                _ => datasets.push(handle.read().await.clone()),
            }
        }
        datasets.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        let bytes = serde_json::to_vec_pretty(&datasets).map_err(LookupError::persistence)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(LookupError::persistence)?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(LookupError::persistence)?;
        debug!(count = datasets.len(), "persisted dataset registry");
        Ok(())
    }

    // ===== Tabular reads =====

    async fn read_blocking<T, F>(&self, id: DatasetId, read: F) -> LookupResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TabularReader, &Path) -> tabulookup_sheet::Result<T> + Send + 'static,
    {
        let source = self.get(id).await?.source;
        let reader = Arc::clone(&self.reader);
        tokio::task::spawn_blocking(move || read(reader.as_ref(), &source))
            .await?
            .map_err(|e| LookupError::from_sheet(id, e))
    }

    /// Sheet names of the dataset's file, in file order.
    pub async fn read_sheet_names(&self, id: DatasetId) -> LookupResult<Vec<String>> {
        self.read_blocking(id, |reader, path| reader.sheet_names(path))
            .await
    }

    /// Column names of one sheet.
    pub async fn read_column_names(&self, id: DatasetId, sheet: &str) -> LookupResult<Vec<String>> {
        let sheet = sheet.to_string();
        self.read_blocking(id, move |reader, path| reader.column_names(path, &sheet))
            .await
    }

    /// Every sheet of the file with its column names, in file order.
    pub async fn read_structure(&self, id: DatasetId) -> LookupResult<IndexMap<String, Vec<String>>> {
        self.read_blocking(id, |reader, path| {
            let mut structure = IndexMap::new();
            for sheet in reader.sheet_names(path)? {
                let columns = reader.column_names(path, &sheet)?;
                structure.insert(sheet, columns);
            }
            Ok(structure)
        })
        .await
    }

    /// All rows of one sheet in source order.
    pub async fn read_sheet_rows(&self, id: DatasetId, sheet: &str) -> LookupResult<Arc<Sheet>> {
        if let Some(cache) = &self.row_cache {
            if let Some(rows) = cache.get(id, sheet).await {
                return Ok(rows);
            }
        }

        let name = sheet.to_string();
        let rows = Arc::new(
            self.read_blocking(id, move |reader, path| reader.read_sheet(path, &name))
                .await?,
        );

        if let Some(cache) = &self.row_cache {
            cache.insert(id, sheet, Arc::clone(&rows)).await;
        }
        Ok(rows)
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}
