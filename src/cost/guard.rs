// Cost ceiling enforcement

use super::QueryCostEstimate;
use thiserror::Error;
use tracing::error;

/// A query was refused because its dry-run estimate is above the ceiling.
///
/// Carries the estimate exactly as produced by the dry run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Query exceeds maximum bytes billed limit. Estimated: {} bytes, Limit: {} bytes (${:.4} USD)",
    .estimate.bytes_estimate,
    .ceiling_bytes,
    .estimate.cost_estimate_usd
)]
pub struct QueryCostExceeded {
    pub estimate: QueryCostEstimate,
    pub ceiling_bytes: u64,
}

impl QueryCostExceeded {
    pub fn cost_estimate_usd(&self) -> f64 {
        self.estimate.cost_estimate_usd
    }
}

/// Compares dry-run estimates against a byte ceiling.
///
/// The override ceiling is the only way past the regular ceiling and is
/// configured separately from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostGuard {
    ceiling_bytes: u64,
    override_ceiling_bytes: Option<u64>,
}

impl CostGuard {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            ceiling_bytes,
            override_ceiling_bytes: None,
        }
    }

    pub fn with_override(mut self, override_ceiling_bytes: Option<u64>) -> Self {
        self.override_ceiling_bytes = override_ceiling_bytes;
        self
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    pub fn override_ceiling_bytes(&self) -> Option<u64> {
        self.override_ceiling_bytes
    }

    /// Refuse `estimate` if it scans more than the regular ceiling.
    pub fn enforce(
        &self,
        estimate: &QueryCostEstimate,
    ) -> std::result::Result<(), QueryCostExceeded> {
        Self::check(estimate, self.ceiling_bytes)
    }

    /// Same as [`CostGuard::enforce`] against an arbitrary ceiling.
    ///
    /// Raw byte comparison; an estimate equal to the ceiling passes.
    pub fn check(
        estimate: &QueryCostEstimate,
        ceiling_bytes: u64,
    ) -> std::result::Result<(), QueryCostExceeded> {
        if estimate.bytes_estimate > ceiling_bytes {
            let refusal = QueryCostExceeded {
                estimate: *estimate,
                ceiling_bytes,
            };
            error!(
                bytes_estimate = estimate.bytes_estimate,
                ceiling_bytes,
                cost_usd = estimate.cost_estimate_usd,
                "{}",
                refusal
            );
            return Err(refusal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Pricing;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_estimate_at_ceiling_is_allowed() {
        let guard = CostGuard::new(10 * GIB);
        let estimate = QueryCostEstimate::from_bytes(10 * GIB, &Pricing::default());
        assert!(guard.enforce(&estimate).is_ok());
    }

    #[test]
    fn test_one_byte_over_is_refused() {
        let guard = CostGuard::new(10 * GIB);
        let estimate = QueryCostEstimate::from_bytes(10 * GIB + 1, &Pricing::default());

        let refusal = guard.enforce(&estimate).unwrap_err();
        assert_eq!(refusal.estimate, estimate);
        assert_eq!(refusal.ceiling_bytes, 10 * GIB);
    }

    #[test]
    fn test_refusal_message_carries_figures() {
        let estimate = QueryCostEstimate::from_bytes(12 * GIB, &Pricing::default());
        let refusal = CostGuard::new(10 * GIB).enforce(&estimate).unwrap_err();

        let message = refusal.to_string();
        assert!(message.contains("Query exceeds maximum bytes billed limit"));
        assert!(message.contains(&(12 * GIB).to_string()));
        assert!(message.contains(&(10 * GIB).to_string()));
        assert!(message.contains("USD"));
    }

    #[test]
    fn test_override_is_opt_in() {
        let guard = CostGuard::new(GIB);
        assert_eq!(guard.override_ceiling_bytes(), None);

        let guard = guard.with_override(Some(100 * GIB));
        assert_eq!(guard.ceiling_bytes(), GIB);
        assert_eq!(guard.override_ceiling_bytes(), Some(100 * GIB));
    }
}
