use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::{
    config::AppConfig,
    error::TokenError,
    models::{ClientCredentialsRequest, ManagementTokenResponse},
};

/// Tokens are refreshed this many seconds before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 60;
/// Upper bound for one upstream fetch while the cache lock is held.
const DEFAULT_FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// A freshly issued token and its lifetime in seconds.
#[derive(Debug, Clone)]
pub struct FetchedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// TokenSource
///
/// Where the cache gets new tokens from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<FetchedToken, TokenError>;
}

/// ClientCredentialsSource
///
/// OAuth client-credentials grant against the tenant's `/oauth/token`, scoped to
/// the Management API audience.
pub struct ClientCredentialsSource {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    audience: String,
}

impl ClientCredentialsSource {
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        let base = config.auth0_base_url();
        Self {
            client,
            token_url: format!("{}/oauth/token", base),
            client_id: config.auth0_client_id.clone(),
            client_secret: config.auth0_client_secret.clone(),
            audience: format!("{}/api/v2/", base),
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn fetch(&self) -> Result<FetchedToken, TokenError> {
        let body = ClientCredentialsRequest {
            grant_type: "client_credentials",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            audience: &self.audience,
        };

        let response = self.client.post(&self.token_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let token: ManagementTokenResponse = response.json().await?;
        Ok(FetchedToken {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// ManagementTokenCache
///
/// Memoizes the Management API token until shortly before it expires. The lock
/// is held across the upstream fetch, so concurrent callers wait for the one
/// in-flight request and then read its result. A fetch that outlives the
/// timeout fails, releasing the lock. Failures are not cached.
pub struct ManagementTokenCache {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<CachedToken>>,
    fetch_timeout: StdDuration,
}

impl ManagementTokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: StdDuration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub async fn get(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch())
            .await
            .map_err(|_| TokenError::Timeout(self.fetch_timeout))??;
        let lifetime = (fetched.expires_in - REFRESH_MARGIN_SECS).max(0);
        tracing::debug!("management token refreshed, valid for {}s", lifetime);

        *cached = Some(CachedToken {
            value: fetched.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        });
        Ok(fetched.access_token)
    }

    /// Drops the cached token, e.g. after the Management API rejected it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
