//! Bearer token provider for the BigQuery client.
//!
//! `TokenManager` hands out access tokens from one of two sources: a
//! pre-issued token taken from configuration, or an authorized-user
//! credentials file whose refresh token is exchanged at the OAuth2 token
//! endpoint. Refreshed tokens are cached in memory until shortly before they
//! expire, and concurrent callers share a single refresh.

use super::{AccessToken, UserCredentials, REFRESH_BUFFER_SECONDS};
use crate::config::BigQueryConfig;
use crate::error::{GuardError, RemoteError, Result};
use crate::utils::logging::sanitize;
use reqwest::Client;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

enum TokenSource {
    Static,
    AuthorizedUser(UserCredentials),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Provides valid access tokens, refreshing them when needed.
#[derive(Clone)]
pub struct TokenManager {
    source: Arc<TokenSource>,
    /// Last token handed out.
    current: Arc<RwLock<Option<AccessToken>>>,
    /// Serializes refresh attempts when a token expires.
    refresh_lock: Arc<Mutex<()>>,
    http_client: Client,
    token_url: String,
    max_retries: u32,
}

impl TokenManager {
    /// Builds a manager from the connection settings.
    ///
    /// A configured `access_token` wins; otherwise the credentials file at
    /// `credentials_path` must exist and hold authorized-user credentials.
    pub fn new(config: &BigQueryConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| GuardError::Auth(format!("Failed to create HTTP client: {}", e)))?;

        if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
            debug!("Using pre-issued access token from configuration");
            return Ok(Self::build(
                TokenSource::Static,
                Some(AccessToken::non_expiring(token)),
                http_client,
                config,
            ));
        }

        let credentials = Self::load_credentials(Path::new(&config.credentials_path))?;
        debug!("Loaded user credentials from {}", config.credentials_path);

        Ok(Self::build(
            TokenSource::AuthorizedUser(credentials),
            None,
            http_client,
            config,
        ))
    }

    /// Manager that always returns `token`.
    pub fn with_static_token(token: impl Into<String>) -> Self {
        Self::build(
            TokenSource::Static,
            Some(AccessToken::non_expiring(token)),
            Client::new(),
            &BigQueryConfig::default(),
        )
    }

    /// Manager refreshing `credentials` against `config.token_url`.
    pub fn with_user_credentials(credentials: UserCredentials, config: &BigQueryConfig) -> Self {
        Self::build(
            TokenSource::AuthorizedUser(credentials),
            None,
            Client::new(),
            config,
        )
    }

    fn build(
        source: TokenSource,
        current: Option<AccessToken>,
        http_client: Client,
        config: &BigQueryConfig,
    ) -> Self {
        Self {
            source: Arc::new(source),
            current: Arc::new(RwLock::new(current)),
            refresh_lock: Arc::new(Mutex::new(())),
            http_client,
            token_url: config.token_url.clone(),
            max_retries: config.max_retries,
        }
    }

    fn load_credentials(path: &Path) -> Result<UserCredentials> {
        if !path.exists() {
            return Err(GuardError::Auth(format!(
                "Credentials file not found: {} (run `gcloud auth application-default login` \
                 or set bigquery.access_token)",
                path.display()
            )));
        }

        Self::check_permissions(path);

        let contents = fs::read_to_string(path)
            .map_err(|e| GuardError::Auth(format!("Failed to read credentials: {}", e)))?;

        let credentials: UserCredentials = serde_json::from_str(&contents)
            .map_err(|e| GuardError::Auth(format!("Invalid credentials JSON format: {}", e)))?;

        if credentials.credential_type != "authorized_user" {
            return Err(GuardError::Auth(format!(
                "Unsupported credentials type '{}' (expected authorized_user)",
                credentials.credential_type
            )));
        }

        Ok(credentials)
    }

    #[cfg(unix)]
    fn check_permissions(path: &Path) {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = fs::metadata(path) {
            let mode = metadata.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                warn!(
                    "Credentials file {} is readable by other users ({:o})",
                    path.display(),
                    mode
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) {}

    /// Returns a valid access token, refreshing it if necessary.
    ///
    /// Uses double-checked locking: a shared read for the common case, then
    /// the refresh mutex, then a second check so only one caller refreshes.
    pub async fn get_token(&self) -> Result<String> {
        {
            let current = self.current.read().await;
            if let Some(token) = current.as_ref() {
                if !token.is_expired(REFRESH_BUFFER_SECONDS) {
                    return Ok(token.token.clone());
                }
            }
        }

        let credentials = match self.source.as_ref() {
            TokenSource::AuthorizedUser(credentials) => credentials,
            TokenSource::Static => {
                return Err(GuardError::Auth("Configured access token is missing".to_string()))
            }
        };

        let _guard = self.refresh_lock.lock().await;

        {
            let current = self.current.read().await;
            if let Some(token) = current.as_ref() {
                if !token.is_expired(REFRESH_BUFFER_SECONDS) {
                    debug!("Token already refreshed by another caller");
                    return Ok(token.token.clone());
                }
            }
        }

        match self.refresh(credentials).await {
            Ok(token) => {
                let value = token.token.clone();
                *self.current.write().await = Some(token);
                crate::metrics::record_token_refresh(true);
                info!("Refreshed access token");
                Ok(value)
            }
            Err(e) => {
                crate::metrics::record_token_refresh(false);
                Err(e)
            }
        }
    }

    async fn refresh(&self, credentials: &UserCredentials) -> Result<AccessToken> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let client = &self.http_client;
        let url = self.token_url.as_str();
        let params = &params;

        let response: TokenResponse =
            crate::utils::retry::with_retry("Token refresh", self.max_retries, || async move {
                let response = client
                    .post(url)
                    .form(params)
                    .send()
                    .await
                    .map_err(|e| {
                        GuardError::TokenRefresh(RemoteError::transport(format!(
                            "OAuth2 network error: {}",
                            e
                        )))
                    })?;

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(GuardError::TokenRefresh(RemoteError::new(
                        Some(status.as_u16()),
                        sanitize(&body),
                    )));
                }

                serde_json::from_str(&body).map_err(|e| {
                    GuardError::Auth(format!("Malformed token response: {}", e))
                })
            })
            .await?;

        let expires_in = response.expires_in.unwrap_or(3600);
        debug!("Refreshed token expires in {} seconds", expires_in);

        Ok(AccessToken {
            token: response.access_token,
            expiry_ms: chrono::Utc::now().timestamp_millis() + expires_in * 1000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn credentials() -> UserCredentials {
        UserCredentials {
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "1//0refresh".to_string(),
            credential_type: "authorized_user".to_string(),
        }
    }

    fn config_for(server: &mockito::ServerGuard) -> BigQueryConfig {
        BigQueryConfig {
            token_url: format!("{}/token", server.url()),
            max_retries: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_token() {
        let manager = TokenManager::with_static_token("ya29.static");
        assert_eq!(manager.get_token().await.unwrap(), "ya29.static");
    }

    #[tokio::test]
    async fn test_refresh_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.fresh","expires_in":3599,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = TokenManager::with_user_credentials(credentials(), &config_for(&server));
        assert_eq!(manager.get_token().await.unwrap(), "ya29.fresh");
        assert_eq!(manager.get_token().await.unwrap(), "ya29.fresh");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Bad Request"}"#)
            .create_async()
            .await;

        let manager = TokenManager::with_user_credentials(credentials(), &config_for(&server));
        let err = manager.get_token().await.unwrap_err();
        match err {
            GuardError::TokenRefresh(remote) => {
                assert_eq!(remote.status, Some(400));
                assert!(remote.message.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_load_credentials() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(
            temp,
            r#"{{"client_id":"id","client_secret":"s","refresh_token":"1//0r","type":"authorized_user"}}"#
        )
        .unwrap();

        let creds = TokenManager::load_credentials(temp.path()).unwrap();
        assert_eq!(creds.client_id, "id");
    }

    #[test]
    fn test_service_account_file_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(
            temp,
            r#"{{"client_id":"id","client_secret":"","refresh_token":"","type":"service_account"}}"#
        )
        .unwrap();

        let result = TokenManager::load_credentials(temp.path());
        assert!(matches!(result, Err(GuardError::Auth(_))));
    }

    #[test]
    fn test_missing_credentials_file() {
        let result = TokenManager::load_credentials(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_configured_token_wins() {
        let config = BigQueryConfig {
            access_token: Some("ya29.configured".to_string()),
            credentials_path: "/nonexistent/path".to_string(),
            ..Default::default()
        };
        assert!(TokenManager::new(&config).is_ok());
    }
}
