// Billed query execution

use crate::cost::Pricing;
use crate::error::Result;
use crate::metrics;
use crate::warehouse::{JobOptions, QueryResult, QueryService};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Runs billed queries and reports what they actually cost.
///
/// Callers are expected to have passed the cost guard first; see
/// [`super::CostAwareClient`].
#[derive(Debug)]
pub struct QueryExecutor<S> {
    service: Arc<S>,
    pricing: Pricing,
}

impl<S> Clone for QueryExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            pricing: self.pricing,
        }
    }
}

impl<S: QueryService> QueryExecutor<S> {
    pub fn new(service: Arc<S>, pricing: Pricing) -> Self {
        Self { service, pricing }
    }

    /// Execute `sql` and log the bytes billed.
    ///
    /// Failures are returned unchanged and never retried here.
    pub async fn execute(&self, sql: &str, options: &JobOptions) -> Result<QueryResult> {
        let start = Instant::now();
        let result = self.service.execute(sql, options).await.map_err(|e| {
            error!("Query execution failed: {}", e);
            e
        })?;
        metrics::record_remote_call("execute", start.elapsed().as_secs_f64());
        metrics::record_bytes("billed", result.bytes_billed);

        let cost_usd = self.pricing.cost_usd(result.bytes_billed);
        info!(
            bytes_billed = result.bytes_billed,
            cost_usd,
            rows = result.num_rows(),
            cache_hit = result.cache_hit,
            job_id = result.job_id.as_deref().unwrap_or("-"),
            "Query complete: {} rows, {} bytes billed (${:.4} USD)",
            result.num_rows(),
            result.bytes_billed,
            cost_usd
        );

        Ok(result)
    }
}
