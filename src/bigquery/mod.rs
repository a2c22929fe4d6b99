//! BigQuery v2 REST backend.
//!
//! This module provides [`BigQueryClient`], the production implementation of
//! [`crate::warehouse::QueryService`], along with the wire models and the
//! row decoder that turns JSON result pages into Arrow batches.

mod client;
pub mod models;
pub mod rows;

pub use client::{parse_table_id, BigQueryClient};
