// Access token management for the BigQuery REST API

mod manager;

pub use manager::TokenManager;

use serde::Deserialize;
use zeroize::Zeroize;

/// Seconds before expiry at which a cached token is treated as expired.
pub const REFRESH_BUFFER_SECONDS: i64 = 60;

/// Authorized-user credentials as written by `gcloud auth application-default login`.
#[derive(Clone, Deserialize, Zeroize)]
#[zeroize(drop)]
pub struct UserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(rename = "type", default)]
    pub credential_type: String,
}

// Custom Debug impl that never logs secrets
impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("type", &self.credential_type)
            .finish()
    }
}

/// A bearer token and the instant (epoch millis) it stops being valid.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct AccessToken {
    pub token: String,
    pub expiry_ms: i64,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expiry_ms", &self.expiry_ms)
            .finish()
    }
}

impl AccessToken {
    /// A token that never expires, for pre-issued tokens.
    pub fn non_expiring(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expiry_ms: i64::MAX,
        }
    }

    /// Check if token is expired or will expire within buffer seconds
    pub fn is_expired(&self, buffer_seconds: i64) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        self.expiry_ms.saturating_sub(now) < buffer_seconds * 1000
    }
}
