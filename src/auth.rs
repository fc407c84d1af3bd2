use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AccessTokenKey, AppConfig},
    cookies::cookie_value,
    error::{ApiError, AuthError},
};

/// Cookie holding the signed session issued after the hosted login.
pub const SESSION_COOKIE: &str = "appSession";

/// Session
///
/// The authenticated caller, as far as the gate needs to know them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Identity provider subject, e.g. `auth0|64f1c0...`.
    pub user_id: String,
}

/// An access token issued by the identity provider for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
}

/// SessionClaims
///
/// Payload of the `appSession` cookie, signed with the session secret.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (sub): the identity provider user id.
    pub sub: String,
    /// Expiration Time (exp): the session is ignored after this timestamp.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
    /// The caller's API access token, when the login requested one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// AccessTokenClaims
///
/// The part of an access token payload the gate reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// IdentityProvider Contract
///
/// Session and token retrieval for an inbound request. The gate only ever sees
/// this trait, so tests swap in `MockIdentityProvider`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means an anonymous caller.
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, AuthError>;

    async fn get_access_token(&self, headers: &HeaderMap) -> Result<AccessToken, AuthError>;
}

/// IdentityState
///
/// The concrete type used to share the identity provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;

/// SessionCookieProvider
///
/// Reads the `appSession` cookie: an HS256 JWT signed with the session secret
/// that carries the user id and the access token obtained at login.
#[derive(Clone)]
pub struct SessionCookieProvider {
    decoding_key: DecodingKey,
}

impl SessionCookieProvider {
    pub fn new(session_secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(session_secret.as_bytes()),
        }
    }

    fn decode_session(&self, headers: &HeaderMap) -> Result<Option<SessionClaims>, AuthError> {
        let Some(cookie) = cookie_value(headers, SESSION_COOKIE) else {
            return Ok(None);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<SessionClaims>(&cookie, &self.decoding_key, &validation)?;
        Ok(Some(data.claims))
    }
}

#[async_trait]
impl IdentityProvider for SessionCookieProvider {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, AuthError> {
        match self.decode_session(headers) {
            Ok(claims) => Ok(claims.map(|c| Session { user_id: c.sub })),
            // An expired or tampered cookie is the same as no session.
            Err(e) => {
                tracing::debug!("ignoring invalid session cookie: {}", e);
                Ok(None)
            }
        }
    }

    async fn get_access_token(&self, headers: &HeaderMap) -> Result<AccessToken, AuthError> {
        self.decode_session(headers)?
            .and_then(|claims| claims.access_token)
            .map(|token| AccessToken { token })
            .ok_or(AuthError::MissingAccessToken)
    }
}

/// PermissionDecoder
///
/// Verifies access tokens and reads their `permissions` claim. Tokens are
/// checked against the tenant's RSA signing key, or an HMAC secret in local
/// setups; audience is checked when configured.
#[derive(Clone)]
pub struct PermissionDecoder {
    key: DecodingKey,
    validation: Validation,
}

impl PermissionDecoder {
    pub fn hs256(secret: &str, audience: Option<&str>) -> Self {
        Self::with_key(
            DecodingKey::from_secret(secret.as_bytes()),
            Algorithm::HS256,
            audience,
        )
    }

    pub fn rs256_pem(pem: &[u8], audience: Option<&str>) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(AuthError::InvalidKey)?;
        Ok(Self::with_key(key, Algorithm::RS256, audience))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AuthError> {
        let audience = config.auth0_audience.as_deref();
        match &config.access_token_key {
            AccessTokenKey::Secret(secret) => Ok(Self::hs256(secret, audience)),
            AccessTokenKey::RsaPem(pem) => Self::rs256_pem(pem.as_bytes(), audience),
        }
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self { key, validation }
    }

    /// Any verification failure is `AuthError::MalformedToken`.
    pub fn decode_permissions(&self, token: &str) -> Result<HashSet<String>, AuthError> {
        let data = decode::<AccessTokenClaims>(token, &self.key, &self.validation)?;
        Ok(data.claims.permissions.into_iter().collect())
    }
}

// The Mock Implementation (For Tests)
/// MockIdentityProvider
///
/// Returns canned session and token values.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    pub session: Option<Session>,
    pub access_token: Option<String>,
    /// When true, `get_access_token` fails as if the provider were unreachable.
    pub fail_token_fetch: bool,
    /// When true, `get_access_token` never completes, like a hung provider.
    pub stall_token_fetch: bool,
}

impl MockIdentityProvider {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: &str, access_token: Option<String>) -> Self {
        Self {
            session: Some(Session {
                user_id: user_id.to_string(),
            }),
            access_token,
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self, _headers: &HeaderMap) -> Result<Option<Session>, AuthError> {
        Ok(self.session.clone())
    }

    async fn get_access_token(&self, _headers: &HeaderMap) -> Result<AccessToken, AuthError> {
        if self.stall_token_fetch {
            std::future::pending::<()>().await;
        }
        if self.fail_token_fetch {
            return Err(AuthError::Provider(
                "Mock Identity Error: Simulation requested".to_string(),
            ));
        }
        self.access_token
            .clone()
            .map(|token| AccessToken { token })
            .ok_or(AuthError::MissingAccessToken)
    }
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated API request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

/// AuthUser Extractor Implementation
///
/// Used by the JSON API routes, which the page gate does not cover.
/// Rejection: `ApiError::Unauthorized` (401) when there is no session.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = IdentityState::from_ref(state);

        let session = identity.get_session(&parts.headers).await.map_err(|e| {
            tracing::warn!("session lookup failed: {}", e);
            ApiError::unauthorized("Authentication required")
        })?;

        session
            .map(|s| AuthUser { id: s.user_id })
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
