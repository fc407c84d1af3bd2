use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::SessionClaims,
    config::AppConfig,
    cookies::LOGIN_STATE_MAX_AGE,
    error::LoginError,
    models::{AuthorizationCodeRequest, AuthorizationCodeResponse, UserInfoResponse},
};

/// Session lifetime when the token endpoint does not say how long the access token lives.
const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;

/// What a completed hosted login yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
    pub user_id: String,
    pub access_token: String,
    /// Access token lifetime in seconds, when the provider reported one.
    pub expires_in: Option<i64>,
}

/// LoginExchange Contract
///
/// Trades the authorization code from the login callback for the caller's
/// identity and access token.
#[async_trait]
pub trait LoginExchange: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<LoginTokens, LoginError>;
}

/// LoginExchangeState
///
/// The concrete type used to share the login exchange across the application state.
pub type LoginExchangeState = Arc<dyn LoginExchange>;

/// AuthorizationCodeExchange
///
/// Authorization-code grant against the tenant's `/oauth/token`, followed by
/// `/userinfo` to learn the subject.
pub struct AuthorizationCodeExchange {
    client: reqwest::Client,
    token_url: String,
    userinfo_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl AuthorizationCodeExchange {
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        let base = config.auth0_base_url();
        Self {
            client,
            token_url: format!("{}/oauth/token", base),
            userinfo_url: format!("{}/userinfo", base),
            client_id: config.auth0_client_id.clone(),
            client_secret: config.auth0_client_secret.clone(),
            redirect_uri: config.callback_url(),
        }
    }

    async fn ensure_success(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, LoginError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LoginError::Upstream {
            endpoint,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl LoginExchange for AuthorizationCodeExchange {
    async fn exchange(&self, code: &str) -> Result<LoginTokens, LoginError> {
        let body = AuthorizationCodeRequest {
            grant_type: "authorization_code",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
            redirect_uri: &self.redirect_uri,
        };
        let response = self.client.post(&self.token_url).json(&body).send().await?;
        let tokens: AuthorizationCodeResponse = Self::ensure_success("token endpoint", response)
            .await?
            .json()
            .await?;

        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;
        let user: UserInfoResponse = Self::ensure_success("userinfo endpoint", response)
            .await?
            .json()
            .await?;

        Ok(LoginTokens {
            user_id: user.sub,
            access_token: tokens.access_token,
            expires_in: tokens.expires_in,
        })
    }
}

// The Mock Implementation (For Tests)
/// MockLoginExchange
///
/// Accepts one known code and answers with canned tokens.
#[derive(Clone, Default)]
pub struct MockLoginExchange {
    pub code: String,
    pub tokens: Option<LoginTokens>,
}

impl MockLoginExchange {
    pub fn accepting(code: &str, tokens: LoginTokens) -> Self {
        Self {
            code: code.to_string(),
            tokens: Some(tokens),
        }
    }

    /// Every exchange fails, as if the tenant were down.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginExchange for MockLoginExchange {
    async fn exchange(&self, code: &str) -> Result<LoginTokens, LoginError> {
        match &self.tokens {
            Some(tokens) if code == self.code => Ok(tokens.clone()),
            Some(_) => Err(LoginError::Upstream {
                endpoint: "token endpoint",
                status: 403,
                body: "invalid_grant".to_string(),
            }),
            None => Err(LoginError::Unavailable(
                "Mock Login Error: Simulation requested".to_string(),
            )),
        }
    }
}

/// LoginStateClaims
///
/// Payload of the login state cookie. `nonce` is echoed by the provider as the
/// OAuth `state` parameter; `return_to` never leaves the server's cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginStateClaims {
    pub nonce: String,
    pub return_to: String,
    pub exp: usize,
}

/// A fresh login attempt: the `state` to send to the provider and the signed
/// cookie that must come back with it.
#[derive(Debug)]
pub struct IssuedLoginState {
    pub nonce: String,
    pub cookie_token: String,
}

pub fn issue_login_state(
    session_secret: &str,
    return_to: &str,
) -> Result<IssuedLoginState, jsonwebtoken::errors::Error> {
    let nonce = Uuid::new_v4().simple().to_string();
    let claims = LoginStateClaims {
        nonce: nonce.clone(),
        return_to: return_to.to_string(),
        exp: (Utc::now().timestamp() + LOGIN_STATE_MAX_AGE as i64) as usize,
    };
    let cookie_token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(session_secret.as_bytes()),
    )?;
    Ok(IssuedLoginState {
        nonce,
        cookie_token,
    })
}

/// The `return_to` of a login attempt, when the cookie is authentic, unexpired,
/// and was issued for this `state`.
pub fn verify_login_state(session_secret: &str, cookie_token: &str, state: &str) -> Option<String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let claims = decode::<LoginStateClaims>(
        cookie_token,
        &DecodingKey::from_secret(session_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| tracing::debug!("rejecting login state cookie: {}", e))
    .ok()?
    .claims;

    (claims.nonce == state).then_some(claims.return_to)
}

/// Signs the `appSession` value for a completed login. Returns the token and
/// its lifetime in seconds.
pub fn issue_session(
    session_secret: &str,
    tokens: &LoginTokens,
) -> Result<(String, u64), jsonwebtoken::errors::Error> {
    let ttl = tokens
        .expires_in
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SESSION_TTL_SECS);
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: tokens.user_id.clone(),
        exp: (now + ttl) as usize,
        iat: now as usize,
        access_token: Some(tokens.access_token.clone()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(session_secret.as_bytes()),
    )?;
    Ok((token, ttl as u64))
}
