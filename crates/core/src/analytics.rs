//! Read-only summaries over the query audit trail.

use crate::model::{Dataset, DatasetId, QueryLog};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of recent queries in a summary.
pub const RECENT_QUERIES: usize = 10;
/// Number of datasets in the popularity ranking.
pub const POPULAR_DATASETS: usize = 5;

/// Query count of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetUsage {
    pub id: DatasetId,
    pub name: String,
    pub query_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_queries: usize,
    pub successful_queries: usize,
    /// Share of successful queries in percent; 0 when nothing was queried.
    pub success_rate: f64,
    /// Newest first.
    pub recent_queries: Vec<QueryLog>,
    /// Most queried first, ties by name.
    pub popular_datasets: Vec<DatasetUsage>,
}

/// Summarize the audit trail of the given datasets.
#[must_use]
pub fn summarize(entries: &[QueryLog], datasets: &[Dataset]) -> AnalyticsSummary {
    let total_queries = entries.len();
    let successful_queries = entries.iter().filter(|e| e.result_found).count();
    let success_rate = if total_queries == 0 {
        0.0
    } else {
        successful_queries as f64 / total_queries as f64 * 100.0
    };

    let mut recent_queries: Vec<QueryLog> = entries.iter().rev().cloned().collect();
    recent_queries.sort_by(|a, b| b.query_time.cmp(&a.query_time));
    recent_queries.truncate(RECENT_QUERIES);

    let mut counts: HashMap<DatasetId, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.dataset_id).or_default() += 1;
    }
    let mut popular_datasets: Vec<DatasetUsage> = datasets
        .iter()
        .map(|d| DatasetUsage {
            id: d.id,
            name: d.name.clone(),
            query_count: counts.get(&d.id).copied().unwrap_or(0),
        })
        .collect();
    popular_datasets.sort_by(|a, b| {
        b.query_count
            .cmp(&a.query_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    popular_datasets.truncate(POPULAR_DATASETS);

    AnalyticsSummary {
        total_queries,
        successful_queries,
        success_rate,
        recent_queries,
        popular_datasets,
    }
}
