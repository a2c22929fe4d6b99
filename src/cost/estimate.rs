//! Byte-to-currency conversion for on-demand query pricing.

use serde::Serialize;

/// On-demand price of scanning one tebibyte, in USD.
pub const DEFAULT_PRICE_PER_TIB_USD: f64 = 6.25;

/// Bytes in one tebibyte (2^40).
pub const BYTES_PER_TIB: u64 = 1 << 40;

/// Price table used to turn a byte count into a currency figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub price_per_tib_usd: f64,
}

impl Pricing {
    pub fn new(price_per_tib_usd: f64) -> Self {
        Self { price_per_tib_usd }
    }

    /// Cost of processing `bytes`, linear in the byte count.
    pub fn cost_usd(&self, bytes: u64) -> f64 {
        bytes as f64 / BYTES_PER_TIB as f64 * self.price_per_tib_usd
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::new(DEFAULT_PRICE_PER_TIB_USD)
    }
}

/// Result of a dry run: how many bytes the query would scan and what that costs.
///
/// The currency value is derived and for display only; enforcement always
/// compares `bytes_estimate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryCostEstimate {
    pub bytes_estimate: u64,
    pub cost_estimate_usd: f64,
}

impl QueryCostEstimate {
    pub fn from_bytes(bytes_estimate: u64, pricing: &Pricing) -> Self {
        Self {
            bytes_estimate,
            cost_estimate_usd: pricing.cost_usd(bytes_estimate),
        }
    }
}
