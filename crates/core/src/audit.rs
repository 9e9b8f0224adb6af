//! Query audit trail.
//!
//! Every lookup that reaches an outcome is appended as a [`QueryLog`]. The
//! trail is append-only; records disappear only when their dataset is
//! deleted. Failures to write are reported through `tracing` and never reach
//! the caller.

use crate::error::{LookupError, LookupResult};
use crate::model::{DatasetId, Filters, QueryLog, QueryOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Storage backend for query logs.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &QueryLog) -> LookupResult<()>;

    /// All entries, oldest first.
    async fn entries(&self) -> LookupResult<Vec<QueryLog>>;

    /// Remove every entry of a dataset. Returns the number removed.
    async fn purge_dataset(&self, dataset: DatasetId) -> LookupResult<usize>;
}

/// Audit sink kept in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<QueryLog>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: &QueryLog) -> LookupResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn entries(&self) -> LookupResult<Vec<QueryLog>> {
        Ok(self.entries.read().await.clone())
    }

    async fn purge_dataset(&self, dataset: DatasetId) -> LookupResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.dataset_id != dataset);
        Ok(before - entries.len())
    }
}

/// Audit sink backed by a JSON-lines file, one record per line.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> LookupResult<Vec<QueryLog>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LookupError::persistence(e)),
        };

        let mut entries = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = number + 1,
                    error = %e,
                    "skipping malformed audit record"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, entry: &QueryLog) -> LookupResult<()> {
        let mut line = serde_json::to_string(entry).map_err(LookupError::persistence)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(LookupError::persistence)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(LookupError::persistence)?;
        file.flush().await.map_err(LookupError::persistence)
    }

    async fn entries(&self) -> LookupResult<Vec<QueryLog>> {
        let _guard = self.write_lock.lock().await;
        self.read_all().await
    }

    async fn purge_dataset(&self, dataset: DatasetId) -> LookupResult<usize> {
        let _guard = self.write_lock.lock().await;
        let entries = self.read_all().await?;
        let before = entries.len();
        let kept: Vec<&QueryLog> = entries.iter().filter(|e| e.dataset_id != dataset).collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut content = String::new();
        for entry in kept {
            content.push_str(&serde_json::to_string(entry).map_err(LookupError::persistence)?);
            content.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(LookupError::persistence)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(LookupError::persistence)?;
        Ok(removed)
    }
}

/// Records query outcomes, isolating the caller from sink failures.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Logger writing to memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAuditLog::new()))
    }

    /// Append one record. Never fails; a sink error is logged and dropped.
    pub async fn record(
        &self,
        dataset: DatasetId,
        sheet: &str,
        applied_filters: &Filters,
        outcome: &QueryOutcome,
        user: Option<&str>,
    ) {
        let entry = QueryLog {
            id: Uuid::new_v4(),
            dataset_id: dataset,
            sheet_name: sheet.to_string(),
            filters_applied: applied_filters.clone(),
            result_found: outcome.found,
            result_data: outcome.results.clone(),
            query_time: Utc::now(),
            user: user.map(str::to_string),
        };
        match self.sink.append(&entry).await {
            Ok(()) => debug!(%dataset, sheet, found = outcome.found, "query logged"),
            Err(e) => warn!(%dataset, sheet, error = %e, "failed to record query"),
        }
    }

    pub async fn entries(&self) -> LookupResult<Vec<QueryLog>> {
        self.sink.entries().await
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> LookupResult<Vec<QueryLog>> {
        let mut entries = self.sink.entries().await?;
        // Reversing first keeps same-timestamp entries newest first
        entries.reverse();
        entries.sort_by(|a, b| b.query_time.cmp(&a.query_time));
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn purge_dataset(&self, dataset: DatasetId) -> LookupResult<usize> {
        self.sink.purge_dataset(dataset).await
    }
}
