//! Configuration data structures for bqguard.
//!
//! This module defines the schema for the application settings: the remote
//! warehouse connection, the cost ceiling, the local result cache and the
//! pipeline defaults used to build date-bounded queries.

use crate::cache::QueryParams;
use crate::error::{GuardError, Result};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest date window a pipeline query may ask for (ten years).
pub const MAX_DAYS_LOOKBACK: u32 = 3650;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Remote warehouse connection settings.
    #[serde(default)]
    pub bigquery: BigQueryConfig,

    /// Cost ceiling and pricing.
    #[serde(default)]
    pub cost: CostConfig,

    /// Local result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Development/production pipeline defaults.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the BigQuery REST connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Project that runs (and pays for) the query jobs. Required for any
    /// remote command.
    #[serde(default)]
    pub project_id: String,

    /// Base URL of the BigQuery v2 REST API.
    /// Default: `https://bigquery.googleapis.com/bigquery/v2`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// OAuth2 token endpoint used to refresh user credentials.
    /// Default: `https://oauth2.googleapis.com/token`
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Job location (e.g. `US`, `EU`). Unset lets the service decide.
    #[serde(default)]
    pub location: Option<String>,

    /// Pre-issued access token (e.g. from `gcloud auth print-access-token`).
    /// Takes precedence over `credentials_path`.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Authorized-user credentials file holding a refresh token.
    /// Default: gcloud's application default credentials.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    /// Connection and request timeout in seconds.
    /// Default: `300` (5 minutes)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Delay between result polls while a job is still running.
    /// Default: `1000`
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts made by callers that wrap a guarded query in the retry helper.
    /// Default: `3`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Settings for the cost guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Largest dry-run estimate allowed to execute, in bytes.
    /// Default: 10 GiB
    #[serde(default = "default_max_bytes_billed")]
    pub max_bytes_billed: u64,

    /// Separately configured ceiling used only when an override is requested
    /// explicitly. Unset means no override is possible.
    #[serde(default)]
    pub override_max_bytes_billed: Option<u64>,

    /// On-demand price per TiB scanned, in USD.
    /// Default: `6.25`
    #[serde(default = "default_price_per_tib")]
    pub price_per_tib_usd: f64,
}

/// Settings for the local result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding `query_<key>.parquet` files.
    /// Default: `data/cache`
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,

    /// Entries older than this are recomputed.
    /// Default: `24`
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

/// Pipeline defaults that differ between development and production runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Development mode narrows lookback and disables sampling.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub dev_mode: bool,

    /// Days of data to query. Default: 1 in dev mode, 30 otherwise.
    #[serde(default)]
    pub max_days_lookback: Option<u32>,

    /// Fraction of rows to sample. Default: 1.0 in dev mode, 0.1 otherwise.
    #[serde(default)]
    pub sample_rate: Option<f64>,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Inclusive UTC date range for partition filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateFilter {
    /// `days` full days ending at the day before `today`.
    ///
    /// Yesterday is the last day included so partitions are complete.
    /// Windows longer than [`MAX_DAYS_LOOKBACK`] are a configuration error.
    pub fn ending_before(today: NaiveDate, days: u32) -> Result<Self> {
        if days > MAX_DAYS_LOOKBACK {
            return Err(GuardError::Config(format!(
                "date window of {} days exceeds the maximum of {}",
                days, MAX_DAYS_LOOKBACK
            )));
        }

        let out_of_range =
            || GuardError::Config(format!("date window of {} days is out of range", days));
        let end = today
            .checked_sub_signed(Duration::days(1))
            .ok_or_else(out_of_range)?;
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days.max(1)) - 1))
            .ok_or_else(out_of_range)?;
        Ok(Self { start, end })
    }

    pub fn start_iso(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_iso(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl PipelineConfig {
    pub fn max_days_lookback(&self) -> u32 {
        self.max_days_lookback
            .unwrap_or(if self.dev_mode { 1 } else { 30 })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
            .unwrap_or(if self.dev_mode { 1.0 } else { 0.1 })
    }

    /// Date range for `days_back` days (default: [`Self::max_days_lookback`]).
    pub fn date_filter(&self, days_back: Option<u32>) -> Result<DateFilter> {
        let days = days_back.unwrap_or_else(|| self.max_days_lookback());
        DateFilter::ending_before(Utc::now().date_naive(), days)
    }

    /// Named parameters contributed by the pipeline settings.
    ///
    /// `days` adds `start_date`/`end_date`; `sample` adds `sample_rate`.
    pub fn query_params(&self, days: Option<u32>, sample: bool) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        if let Some(days) = days {
            let filter = self.date_filter(Some(days))?;
            params.insert("start_date", filter.start_iso());
            params.insert("end_date", filter.end_iso());
        }
        if sample {
            params.insert("sample_rate", self.sample_rate());
        }
        Ok(params)
    }
}

// Default trait implementations linking to custom logic

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            location: None,
            access_token: None,
            credentials_path: default_credentials_path(),
            timeout_seconds: default_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            max_bytes_billed: default_max_bytes_billed(),
            override_max_bytes_billed: None,
            price_per_tib_usd: default_price_per_tib(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dev_mode: true,
            max_days_lookback: None,
            sample_rate: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_api_base_url() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_credentials_path() -> String {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gcloud")
        .join("application_default_credentials.json")
        .to_string_lossy()
        .to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_bytes_billed() -> u64 {
    10 * 1024 * 1024 * 1024 // 10 GiB
}

fn default_price_per_tib() -> f64 {
    crate::cost::DEFAULT_PRICE_PER_TIB_USD
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("data").join("cache")
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
