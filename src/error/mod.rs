// Error types for bqguard

use crate::cost::QueryCostExceeded;
use std::fmt;
use thiserror::Error;

/// Failure reported by the remote query service.
///
/// `status` is the HTTP status when the service answered, `None` when the
/// request never got a response (connect, timeout, body read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Cost estimation failed: {0}")]
    CostEstimation(RemoteError),

    #[error(transparent)]
    QueryCostExceeded(#[from] QueryCostExceeded),

    #[error("Query execution failed: {0}")]
    QueryExecution(RemoteError),

    #[error("Compute function must return a table, got {type_name}: {reason}")]
    InvalidComputeResult {
        type_name: &'static str,
        reason: String,
    },

    #[error("Row decoding error: {0}")]
    RowDecode(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(RemoteError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Invalid cache pattern: {0}")]
    InvalidPattern(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl GuardError {
    /// Whether retrying the whole operation may succeed.
    ///
    /// Cost refusals are never transient: the same query re-estimates to the
    /// same size.
    pub fn is_transient(&self) -> bool {
        match self {
            GuardError::CostEstimation(remote)
            | GuardError::QueryExecution(remote)
            | GuardError::TokenRefresh(remote) => {
                remote.status.map_or(true, crate::utils::retry::is_retryable)
            }
            GuardError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn is_cost_refusal(&self) -> bool {
        matches!(self, GuardError::QueryCostExceeded(_))
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
