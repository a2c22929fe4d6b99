// bqguard - Cost-guarded, locally cached BigQuery queries

pub mod auth;
pub mod bigquery;
pub mod cache;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod metrics;
pub mod query;
pub mod utils;
pub mod warehouse;
