//! Request options and results exchanged with the query service.

use crate::cache::{QueryParams, TableOutput};
use crate::error::GuardError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Scheduling priority of a query job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryPriority {
    #[default]
    Interactive,
    Batch,
}

/// Per-job customisations.
///
/// `maximum_bytes_billed` is filled in by the cost-aware client with the
/// ceiling in force, so the service enforces the same limit server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    /// Let the service answer from its own result cache. Never relied on for
    /// correctness.
    pub use_query_cache: bool,
    pub use_legacy_sql: bool,
    pub priority: QueryPriority,
    pub labels: BTreeMap<String, String>,
    /// Named query parameters (`@name` in the SQL text).
    pub parameters: Option<QueryParams>,
    pub maximum_bytes_billed: Option<u64>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            use_query_cache: true,
            use_legacy_sql: false,
            priority: QueryPriority::default(),
            labels: BTreeMap::new(),
            parameters: None,
            maximum_bytes_billed: None,
        }
    }
}

impl JobOptions {
    pub fn with_parameters(mut self, parameters: QueryParams) -> Self {
        self.parameters = (!parameters.is_empty()).then_some(parameters);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Outcome of a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DryRunStats {
    /// Bytes the query would process; zero when the service reports none.
    pub bytes_processed: u64,
}

/// Materialised result of a billed execution.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub batch: RecordBatch,
    pub bytes_billed: u64,
    /// The service answered from its own result cache.
    pub cache_hit: bool,
    pub job_id: Option<String>,
}

impl QueryResult {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

impl TableOutput for QueryResult {
    fn into_table(self) -> std::result::Result<Option<RecordBatch>, GuardError> {
        Ok(Some(self.batch))
    }
}

/// Column description in [`TableInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableField {
    pub name: String,
    pub field_type: String,
    pub mode: Option<String>,
    pub description: Option<String>,
}

/// Table metadata as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub project: String,
    pub dataset_id: String,
    pub table_id: String,
    pub num_rows: Option<u64>,
    pub num_bytes: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub fields: Vec<TableField>,
}
