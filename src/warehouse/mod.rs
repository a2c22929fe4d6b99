//! The remote warehouse seam.
//!
//! Everything in this crate that talks to the billed service goes through the
//! [`QueryService`] trait: a non-billed dry run and a billed execution, both
//! reporting byte counts. The REST implementation lives in
//! [`crate::bigquery`]; tests substitute in-process fakes.

mod models;

pub use models::*;

use crate::error::Result;
use std::future::Future;

/// Operations consumed from the metered query service.
///
/// Implementations must not retry: a retried dry run has to re-estimate, and
/// a retried execution has to be billed visibly.
pub trait QueryService: Send + Sync {
    /// Estimate the bytes `sql` would process without running it.
    ///
    /// Failures surface as [`crate::error::GuardError::CostEstimation`].
    fn dry_run(
        &self,
        sql: &str,
        options: &JobOptions,
    ) -> impl Future<Output = Result<DryRunStats>> + Send;

    /// Run `sql` for real and materialise the full result.
    ///
    /// Failures surface as [`crate::error::GuardError::QueryExecution`].
    fn execute(
        &self,
        sql: &str,
        options: &JobOptions,
    ) -> impl Future<Output = Result<QueryResult>> + Send;

    /// Fetch metadata about a table. Not billed.
    fn table_info(&self, table_id: &str) -> impl Future<Output = Result<TableInfo>> + Send;
}
