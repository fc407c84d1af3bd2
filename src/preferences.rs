use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use url::{Url, form_urlencoded};

use crate::{
    config::AppConfig,
    error::PreferenceError,
    models::{UpdateUserMetadataRequest, UserMetadata, UserProfileResponse},
    token_cache::ManagementTokenCache,
};

// 1. UserPreferenceStore Contract
/// UserPreferenceStore
///
/// Where a user's preferred language lives. Lookups are best effort: callers
/// treat any error as "no preference".
#[async_trait]
pub trait UserPreferenceStore: Send + Sync {
    async fn get_user_language(&self, user_id: &str) -> Result<Option<String>, PreferenceError>;

    async fn set_user_language(&self, user_id: &str, language: &str)
    -> Result<(), PreferenceError>;
}

/// PreferenceState
///
/// The concrete type used to share the preference store across the application state.
pub type PreferenceState = Arc<dyn UserPreferenceStore>;

// 2. The Real Implementation (Management API)
/// ManagementApiStore
///
/// Keeps the preference in the identity provider's `user_metadata.language`,
/// read and written through the Management API.
pub struct ManagementApiStore {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<ManagementTokenCache>,
}

impl ManagementApiStore {
    pub fn new(client: reqwest::Client, config: &AppConfig, tokens: Arc<ManagementTokenCache>) -> Self {
        Self {
            client,
            base_url: config.auth0_base_url(),
            tokens,
        }
    }

    /// `{base}/api/v2/users/{user_id}` with the id percent-encoded (`auth0|...`).
    fn user_url(&self, user_id: &str) -> Result<Url, PreferenceError> {
        let encoded: String = form_urlencoded::byte_serialize(user_id.as_bytes()).collect();
        Url::parse(&format!("{}/api/v2/users/{}", self.base_url, encoded))
            .map_err(|e| PreferenceError::Unavailable(format!("bad tenant url: {}", e)))
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, PreferenceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(PreferenceError::Upstream {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl UserPreferenceStore for ManagementApiStore {
    async fn get_user_language(&self, user_id: &str) -> Result<Option<String>, PreferenceError> {
        let token = self.tokens.get().await?;
        let response = self
            .client
            .get(self.user_url(user_id)?)
            .bearer_auth(token)
            .query(&[("fields", "user_metadata")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let profile: UserProfileResponse = self.check(response).await?.json().await?;
        Ok(profile.user_metadata.and_then(|m| m.language))
    }

    async fn set_user_language(
        &self,
        user_id: &str,
        language: &str,
    ) -> Result<(), PreferenceError> {
        let token = self.tokens.get().await?;
        let body = UpdateUserMetadataRequest {
            user_metadata: UserMetadata {
                language: Some(language.to_string()),
            },
        };

        let response = self
            .client
            .patch(self.user_url(user_id)?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockPreferenceStore
///
/// In-memory preferences keyed by user id.
#[derive(Default)]
pub struct MockPreferenceStore {
    languages: RwLock<HashMap<String, String>>,
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    /// When true, lookups never complete.
    pub stall: bool,
}

impl MockPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn new_stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn with_language(user_id: &str, language: &str) -> Self {
        let store = Self::new();
        if let Ok(mut languages) = store.languages.write() {
            languages.insert(user_id.to_string(), language.to_string());
        }
        store
    }
}

#[async_trait]
impl UserPreferenceStore for MockPreferenceStore {
    async fn get_user_language(&self, user_id: &str) -> Result<Option<String>, PreferenceError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.should_fail {
            return Err(PreferenceError::Unavailable(
                "Mock Preference Error: Simulation requested".to_string(),
            ));
        }
        let languages = self
            .languages
            .read()
            .map_err(|_| PreferenceError::Unavailable("poisoned".to_string()))?;
        Ok(languages.get(user_id).cloned())
    }

    async fn set_user_language(
        &self,
        user_id: &str,
        language: &str,
    ) -> Result<(), PreferenceError> {
        if self.should_fail {
            return Err(PreferenceError::Unavailable(
                "Mock Preference Error: Simulation requested".to_string(),
            ));
        }
        let mut languages = self
            .languages
            .write()
            .map_err(|_| PreferenceError::Unavailable("poisoned".to_string()))?;
        languages.insert(user_id.to_string(), language.to_string());
        Ok(())
    }
}
