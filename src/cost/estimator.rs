// Dry-run cost estimation

use super::{Pricing, QueryCostEstimate};
use crate::error::Result;
use crate::metrics;
use crate::warehouse::{JobOptions, QueryService};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Turns a non-billed dry run into a [`QueryCostEstimate`].
#[derive(Debug)]
pub struct CostEstimator<S> {
    service: Arc<S>,
    pricing: Pricing,
}

impl<S> Clone for CostEstimator<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            pricing: self.pricing,
        }
    }
}

impl<S: QueryService> CostEstimator<S> {
    pub fn new(service: Arc<S>, pricing: Pricing) -> Self {
        Self { service, pricing }
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    /// Dry-run `sql` and price the reported byte count.
    ///
    /// A failed dry run is returned as-is; it is never read as "free".
    pub async fn estimate(&self, sql: &str, options: &JobOptions) -> Result<QueryCostEstimate> {
        let start = Instant::now();
        let stats = self.service.dry_run(sql, options).await.map_err(|e| {
            error!("Dry run failed: {}", e);
            e
        })?;
        metrics::record_remote_call("dry_run", start.elapsed().as_secs_f64());

        let estimate = QueryCostEstimate::from_bytes(stats.bytes_processed, &self.pricing);
        metrics::record_bytes("estimated", estimate.bytes_estimate);

        info!(
            bytes_estimate = estimate.bytes_estimate,
            cost_usd = estimate.cost_estimate_usd,
            "Query cost estimate: {} bytes (${:.4} USD)",
            estimate.bytes_estimate,
            estimate.cost_estimate_usd
        );

        Ok(estimate)
    }
}
