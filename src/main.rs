// bqguard - Cost-guarded, locally cached BigQuery queries

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use bqguard::auth::TokenManager;
use bqguard::bigquery::BigQueryClient;
use bqguard::cache::QueryCache;
use bqguard::cli::{Args, CacheAction, Command};
use bqguard::config::AppConfig;
use bqguard::error::GuardError;
use bqguard::query::CostAwareClient;
use bqguard::utils::{logging, retry::with_retry};
use bqguard::warehouse::{JobOptions, QueryResult};
use clap::Parser;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = AppConfig::load(args.config.as_deref())?;

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    debug!("Starting bqguard v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Run the command
    let result = run(args.command, &config).await;

    if args.print_metrics {
        eprint!("{}", bqguard::metrics::gather_metrics());
    }

    result
}

async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Estimate { sql } => {
            let client = connect(config)?;
            let estimate = client.estimate_query_cost(&sql).await?;
            let ceiling = client.guard().ceiling_bytes();

            println!("Bytes processed: {}", estimate.bytes_estimate);
            println!("Estimated cost:  ${:.4} USD", estimate.cost_estimate_usd);
            println!(
                "Ceiling:         {} bytes ({})",
                ceiling,
                if estimate.bytes_estimate > ceiling {
                    "would be refused"
                } else {
                    "within limit"
                }
            );
        }

        Command::Query {
            sql,
            params: params_from_cli,
            days,
            sample,
            force_refresh,
            no_cache,
            use_override,
        } => {
            let mut params = config.pipeline.query_params(days, sample)?;
            for (name, value) in params_from_cli {
                params.insert(name, value);
            }

            let client = connect(config)?;
            info!("{}", client);
            let options = JobOptions::default().with_parameters(params.clone());
            let max_retries = config.bigquery.max_retries;

            let batch = if no_cache {
                guarded_query(&client, &sql, &options, use_override, max_retries)
                    .await?
                    .batch
            } else {
                let cache = QueryCache::new(&config.cache)?;
                cache
                    .get_or_compute(&sql, Some(&params), force_refresh, || {
                        guarded_query(&client, &sql, &options, use_override, max_retries)
                    })
                    .await?
            };

            println!("{}", pretty_format_batches(&[batch.clone()])?);
            println!("({} rows)", batch.num_rows());
        }

        Command::TableInfo { table_id } => {
            let client = connect(config)?;
            let table = client.table_info(&table_id).await?;
            println!("{}", serde_json::to_string_pretty(&table)?);
        }

        Command::Cache { action } => {
            let cache = QueryCache::new(&config.cache)?;
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats()?;
                    println!("Directory:   {}", cache.directory().display());
                    println!("Files:       {}", stats.file_count);
                    println!("Total size:  {:.2} MB", stats.total_size_mb());
                    println!("Oldest:      {:.1} hours", stats.oldest_age_hours());
                    println!("Newest:      {:.1} hours", stats.newest_age_hours());
                    println!("Expired:     {}", stats.stale_count);
                }
                CacheAction::Clear { pattern } => {
                    let deleted = cache.clear(pattern.as_deref())?;
                    println!("Deleted {} cache files", deleted);
                }
            }
        }
    }

    Ok(())
}

fn connect(config: &AppConfig) -> Result<CostAwareClient<BigQueryClient>> {
    config.require_project()?;
    let tokens =
        TokenManager::new(&config.bigquery).context("Failed to set up BigQuery credentials")?;
    let service = BigQueryClient::new(&config.bigquery, tokens)?;
    Ok(CostAwareClient::new(service, &config.cost))
}

/// One guarded query, retried as a whole on transient failures so every
/// attempt re-estimates.
async fn guarded_query(
    client: &CostAwareClient<BigQueryClient>,
    sql: &str,
    options: &JobOptions,
    use_override: bool,
    max_retries: u32,
) -> Result<QueryResult, GuardError> {
    with_retry("Guarded query", max_retries, || async move {
        if use_override {
            client.safe_query_with_override(sql, options).await
        } else {
            client.safe_query_with(sql, options).await
        }
    })
    .await
}
