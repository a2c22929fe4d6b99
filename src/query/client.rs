//! Cost-aware query client.
//!
//! Every billed execution made through [`CostAwareClient`] is preceded by a
//! dry run and a ceiling check. There is no flag to skip the check; the only
//! way past the regular ceiling is the separately configured override
//! ceiling, used by [`CostAwareClient::safe_query_with_override`].

use super::QueryExecutor;
use crate::config::CostConfig;
use crate::cost::{CostEstimator, CostGuard, Pricing, QueryCostEstimate, QueryCostExceeded};
use crate::error::{GuardError, Result};
use crate::metrics;
use crate::warehouse::{JobOptions, QueryResult, QueryService, TableInfo};
use arrow::record_batch::RecordBatch;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

const GIB: f64 = (1u64 << 30) as f64;

/// Result of a guarded query: the routine refusal is a value, not an error.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Completed(QueryResult),
    Refused(QueryCostExceeded),
}

impl QueryOutcome {
    /// Convert a refusal into [`GuardError::QueryCostExceeded`].
    pub fn into_result(self) -> Result<QueryResult> {
        match self {
            QueryOutcome::Completed(result) => Ok(result),
            QueryOutcome::Refused(refusal) => Err(refusal.into()),
        }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, QueryOutcome::Refused(_))
    }
}

/// Estimate, guard and execute queries against a [`QueryService`].
pub struct CostAwareClient<S> {
    service: Arc<S>,
    estimator: CostEstimator<S>,
    executor: QueryExecutor<S>,
    guard: CostGuard,
}

impl<S: QueryService> CostAwareClient<S> {
    pub fn new(service: S, config: &CostConfig) -> Self {
        Self::from_shared(Arc::new(service), config)
    }

    pub fn from_shared(service: Arc<S>, config: &CostConfig) -> Self {
        let pricing = Pricing::new(config.price_per_tib_usd);
        Self {
            estimator: CostEstimator::new(Arc::clone(&service), pricing),
            executor: QueryExecutor::new(Arc::clone(&service), pricing),
            guard: CostGuard::new(config.max_bytes_billed)
                .with_override(config.override_max_bytes_billed),
            service,
        }
    }

    pub fn guard(&self) -> &CostGuard {
        &self.guard
    }

    /// Dry-run `sql` without executing it.
    pub async fn estimate_query_cost(&self, sql: &str) -> Result<QueryCostEstimate> {
        self.estimator.estimate(sql, &JobOptions::default()).await
    }

    /// Estimate, check against the configured ceiling, then execute.
    ///
    /// Estimation and execution failures are errors; an over-budget query is
    /// [`QueryOutcome::Refused`] and never reaches the execute call.
    pub async fn run_guarded(&self, sql: &str, options: &JobOptions) -> Result<QueryOutcome> {
        self.run_with_ceiling(sql, options, self.guard.ceiling_bytes())
            .await
    }

    async fn run_with_ceiling(
        &self,
        sql: &str,
        options: &JobOptions,
        ceiling_bytes: u64,
    ) -> Result<QueryOutcome> {
        // The service enforces the same limit again at execution time.
        let mut options = options.clone();
        options.maximum_bytes_billed = Some(ceiling_bytes);

        let estimate = self.estimator.estimate(sql, &options).await?;

        if let Err(refusal) = CostGuard::check(&estimate, ceiling_bytes) {
            metrics::record_refusal();
            return Ok(QueryOutcome::Refused(refusal));
        }

        info!(
            bytes_estimate = estimate.bytes_estimate,
            ceiling_bytes,
            "Cost check passed; executing query"
        );

        let result = self.executor.execute(sql, &options).await?;
        Ok(QueryOutcome::Completed(result))
    }

    /// Guarded execution returning just the table.
    ///
    /// Fails with [`GuardError::QueryCostExceeded`] when refused.
    pub async fn safe_query(&self, sql: &str) -> Result<RecordBatch> {
        self.safe_query_with(sql, &JobOptions::default())
            .await
            .map(|result| result.batch)
    }

    /// Guarded execution with job customisations.
    pub async fn safe_query_with(&self, sql: &str, options: &JobOptions) -> Result<QueryResult> {
        self.run_guarded(sql, options).await?.into_result()
    }

    /// Guarded execution against the override ceiling.
    ///
    /// Fails with a configuration error when no override ceiling is set.
    pub async fn safe_query_with_override(
        &self,
        sql: &str,
        options: &JobOptions,
    ) -> Result<QueryResult> {
        let ceiling_bytes = self.guard.override_ceiling_bytes().ok_or_else(|| {
            GuardError::Config(
                "cost override requested but cost.override_max_bytes_billed is not set".to_string(),
            )
        })?;

        warn!(
            ceiling_bytes,
            regular_ceiling_bytes = self.guard.ceiling_bytes(),
            "Running query against the override ceiling"
        );

        self.run_with_ceiling(sql, options, ceiling_bytes)
            .await?
            .into_result()
    }

    /// Table metadata; not billed and not guarded.
    pub async fn table_info(&self, table_id: &str) -> Result<TableInfo> {
        self.service.table_info(table_id).await
    }
}

impl<S: QueryService> fmt::Display for CostAwareClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CostAwareClient(max_bytes_billed={:.2}GiB",
            self.guard.ceiling_bytes() as f64 / GIB
        )?;
        if let Some(ceiling) = self.guard.override_ceiling_bytes() {
            write!(f, ", override={:.2}GiB", ceiling as f64 / GIB)?;
        }
        write!(
            f,
            ", price=${}/TiB)",
            self.estimator.pricing().price_per_tib_usd
        )
    }
}
