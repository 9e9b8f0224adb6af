//! Exact-match lookup of a single row.

use crate::audit::AuditLogger;
use crate::error::{LookupError, LookupResult};
use crate::model::{DatasetId, Filters, QueryOutcome, ResultRow};
use crate::sheet_config::SheetConfigStore;
use crate::store::DatasetStore;
use crate::value::{ResultValue, TOTAL_COLUMN};
use std::sync::Arc;
use std::time::Duration;
use tabulookup_sheet::{CellValue, Sheet};
use tracing::debug;

/// Result of one executed lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecution {
    /// The filters that took part in matching.
    pub applied_filters: Filters,
    pub outcome: QueryOutcome,
}

#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<DatasetStore>,
    configs: SheetConfigStore,
    audit: AuditLogger,
    timeout: Duration,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(
        store: Arc<DatasetStore>,
        configs: SheetConfigStore,
        audit: AuditLogger,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            configs,
            audit,
            timeout,
        }
    }

    /// Look up the first row matching every filter and record the attempt.
    ///
    /// The deadline bounds reading and matching only. An outcome that was
    /// reached is always recorded.
    pub async fn execute(
        &self,
        id: DatasetId,
        sheet: &str,
        filters: &Filters,
        user: Option<&str>,
    ) -> LookupResult<QueryExecution> {
        let execution = tokio::time::timeout(self.timeout, self.lookup(id, sheet, filters))
            .await
            .map_err(|_| LookupError::Timeout(self.timeout.as_millis()))??;

        self.audit
            .record(id, sheet, &execution.applied_filters, &execution.outcome, user)
            .await;
        Ok(execution)
    }

    async fn lookup(&self, id: DatasetId, sheet: &str, filters: &Filters) -> LookupResult<QueryExecution> {
        if !self.store.is_active(id).await? {
            return Err(LookupError::DatasetInactive(id));
        }
        let config = self.configs.get_config(id, sheet).await?;
        if !config.enabled {
            return Err(LookupError::SheetDisabled(sheet.to_string()));
        }

        let rows = self.store.read_sheet_rows(id, sheet).await?;
        let (applied_filters, outcome) = evaluate(&rows, filters, &config.result_columns);
        debug!(
            dataset = %id,
            sheet,
            filters = applied_filters.len(),
            found = outcome.found,
            "query executed"
        );
        Ok(QueryExecution {
            applied_filters,
            outcome,
        })
    }
}

/// Match `filters` against `sheet` and project the first matching row.
///
/// Filters with an empty value or naming a column the sheet does not have
/// are ignored; the remaining ones are returned alongside the outcome.
/// Cells are compared by their canonical string form and empty cells never
/// match.
#[must_use]
pub fn evaluate(sheet: &Sheet, filters: &Filters, result_columns: &[String]) -> (Filters, QueryOutcome) {
    let mut applied = Filters::new();
    let mut predicates: Vec<(usize, &str)> = Vec::new();
    for (column, value) in filters {
        if value.is_empty() {
            continue;
        }
        if let Ok(position) = sheet.column_position(column) {
            applied.insert(column.clone(), value.clone());
            predicates.push((position, value.as_str()));
        }
    }

    let hit = sheet.rows().find(|row| {
        predicates.iter().all(|(position, expected)| {
            row.get(*position)
                .is_some_and(|cell| !cell.is_null() && cell.as_str() == *expected)
        })
    });

    let outcome = match hit {
        Some(row) => QueryOutcome::found(project(sheet, row, result_columns)),
        None => QueryOutcome::not_found(),
    };
    (applied, outcome)
}

fn project(sheet: &Sheet, row: &[CellValue], result_columns: &[String]) -> ResultRow {
    let value_of = |column: &str| {
        sheet
            .column_position(column)
            .ok()
            .and_then(|position| row.get(position))
            .map_or(ResultValue::Null, |cell| ResultValue::project(column, cell))
    };

    let mut results = ResultRow::new();
    if result_columns.iter().any(|c| c == TOTAL_COLUMN) {
        results.insert(TOTAL_COLUMN.to_string(), value_of(TOTAL_COLUMN));
    }
    for column in result_columns {
        if column != TOTAL_COLUMN {
            results.insert(column.clone(), value_of(column));
        }
    }
    results
}
