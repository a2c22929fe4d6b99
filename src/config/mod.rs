// Configuration module

mod models;

pub use models::*;

use crate::error::{GuardError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest, `BQGUARD__SECTION__KEY`)
    /// 2. Config file (`path`, or `~/.bqguard/config.toml` when absent)
    /// 3. Defaults (lowest)
    ///
    /// This is the only place the process environment is read.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file
            .add_source(File::from(file).required(required))
            // Override with environment variables (prefix: BQGUARD__)
            .add_source(
                Environment::with_prefix("BQGUARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GuardError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| GuardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.bigquery.poll_interval_ms == 0 {
            return Err(GuardError::Config(
                "bigquery.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if let Some(days) = self.pipeline.max_days_lookback {
            if days == 0 || days > MAX_DAYS_LOOKBACK {
                return Err(GuardError::Config(format!(
                    "pipeline.max_days_lookback must be between 1 and {}, got {}",
                    MAX_DAYS_LOOKBACK, days
                )));
            }
        }
        if let Some(rate) = self.pipeline.sample_rate {
            if rate.is_nan() || rate <= 0.0 || rate > 1.0 {
                return Err(GuardError::Config(format!(
                    "pipeline.sample_rate must be in (0, 1], got {}",
                    rate
                )));
            }
        }
        let price = self.cost.price_per_tib_usd;
        if price.is_nan() || price < 0.0 {
            return Err(GuardError::Config(
                "cost.price_per_tib_usd must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Project id, required before any remote call.
    pub fn require_project(&self) -> Result<&str> {
        let project = self.bigquery.project_id.trim();
        if project.is_empty() {
            return Err(GuardError::Config(
                "bigquery.project_id is required (set BQGUARD__BIGQUERY__PROJECT_ID)".to_string(),
            ));
        }
        Ok(project)
    }

    fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bqguard")
            .join("config.toml")
    }
}
