// CLI module for bqguard

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// bqguard - Cost-guarded, locally cached BigQuery queries
#[derive(Parser, Debug)]
#[command(name = "bqguard", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.bqguard/config.toml)
    #[arg(long, global = true, env = "BQGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dry-run a query and print the bytes it would scan and what that costs
    Estimate {
        /// SQL text
        sql: String,
    },

    /// Run a query through the cost guard and the local result cache
    Query {
        /// SQL text
        sql: String,

        /// Named query parameter (`@name` in the SQL); repeatable
        #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Add `start_date`/`end_date` parameters covering the last N full days
        #[arg(long, value_name = "N")]
        days: Option<u32>,

        /// Add a `sample_rate` parameter from `pipeline.sample_rate`
        #[arg(long)]
        sample: bool,

        /// Recompute even when a fresh cached result exists
        #[arg(long)]
        force_refresh: bool,

        /// Bypass the local result cache entirely
        #[arg(long)]
        no_cache: bool,

        /// Use the configured override ceiling instead of the regular one
        #[arg(long = "override")]
        use_override: bool,
    },

    /// Print table metadata
    TableInfo {
        /// `project.dataset.table` or `dataset.table`
        table_id: String,
    },

    /// Inspect or evict locally cached results
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Summarise cached files
    Stats,

    /// Delete cached files
    Clear {
        /// File-name glob (default: every cached result)
        #[arg(long)]
        pattern: Option<String>,
    },
}

/// Parse `NAME=VALUE`. The value is read as JSON when it parses (numbers,
/// booleans, quoted strings, arrays) and as a plain string otherwise.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }

    let value =
        serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}
