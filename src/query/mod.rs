// Guarded query execution module

mod client;
mod executor;

pub use client::{CostAwareClient, QueryOutcome};
pub use executor::QueryExecutor;
