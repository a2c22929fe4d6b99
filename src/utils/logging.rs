//! Structured logging and secret redaction.
//!
//! This module configures the `tracing` ecosystem for the binary and provides
//! a scrubber so OAuth tokens echoed back in remote error bodies never reach
//! a log sink.

use crate::config::LoggingConfig;
use crate::error::{GuardError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Supports three output formats:
/// - `json`: Structured JSON logs for pipeline log collection.
/// - `compact`: Single-line human-readable output.
/// - `pretty` (default): Multi-line, colorized output for development.
///
/// `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    result.map_err(|e| GuardError::Config(format!("Failed to initialize logging: {}", e)))
}

const REDACTIONS: &[(&str, &str)] = &[
    // Google OAuth2 access tokens
    ("ya29.", "[REDACTED_ACCESS_TOKEN]"),
    // Google refresh tokens
    ("1//0", "[REDACTED_REFRESH_TOKEN]"),
];

/// Replaces every Google access or refresh token in `input` with a placeholder.
pub fn sanitize(input: &str) -> String {
    let mut result = input.to_string();

    for (marker, placeholder) in REDACTIONS {
        let mut search_from = 0;
        while let Some(offset) = result[search_from..].find(marker) {
            let start = search_from + offset;
            let end = result[start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',')
                .map(|i| start + i)
                .unwrap_or(result.len());
            result.replace_range(start..end, placeholder);
            search_from = start + placeholder.len();
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_access_token() {
        let input = "Authorization: Bearer ya29.a0AfH6SMC...";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_ACCESS_TOKEN]"));
        assert!(!output.contains("ya29.a0AfH6SMC"));
    }

    #[test]
    fn test_sanitize_refresh_token() {
        let input = r#"{"refresh_token": "1//01S6LICZta2ee"}"#;
        let output = sanitize(input);
        assert_eq!(output, r#"{"refresh_token": "[REDACTED_REFRESH_TOKEN]"}"#);
    }

    #[test]
    fn test_sanitize_every_occurrence() {
        let input = "first ya29.aaa second ya29.bbb";
        let output = sanitize(input);
        assert_eq!(
            output,
            "first [REDACTED_ACCESS_TOKEN] second [REDACTED_ACCESS_TOKEN]"
        );
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        let input = "Syntax error: Unrecognized name: adress at [1:8]";
        assert_eq!(sanitize(input), input);
    }
}
