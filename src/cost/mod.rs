// Cost estimation and enforcement

mod estimate;
mod estimator;
mod guard;

pub use estimate::{Pricing, QueryCostEstimate, BYTES_PER_TIB, DEFAULT_PRICE_PER_TIB_USD};
pub use estimator::CostEstimator;
pub use guard::{CostGuard, QueryCostExceeded};
