use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures while reading the caller's session or access token.
///
/// Inside the access gate every variant is fail-closed: a permission check that
/// hits one of these resolves to the forbidden page.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session carries no access token")]
    MissingAccessToken,
    #[error("malformed token: {0}")]
    MalformedToken(#[from] jsonwebtoken::errors::Error),
    #[error("invalid token verification key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),
    #[error("identity provider unavailable: {0}")]
    Provider(String),
}

/// Failures while fetching the Management API token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("token request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures while completing a hosted login at the callback.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}: {body}")]
    Upstream {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[error("login exchange unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the user preference store. Never surfaced to page requests;
/// the gate degrades to the default locale instead.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("preference store returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("preference store unavailable: {0}")]
    Unavailable(String),
}

/// Route table configuration errors, raised once at startup.
#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("failed to read route table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse route table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("route table declares no locales")]
    EmptyLocales,
    #[error("default locale `{0}` is not one of the supported locales")]
    UnknownDefaultLocale(String),
    #[error("route key `{0}` is declared more than once")]
    DuplicateRouteKey(String),
    #[error("localized path `{path}` is shared by `{first}` and `{second}` for locale `{locale}`")]
    DuplicateLocalizedPath {
        locale: String,
        path: String,
        first: String,
        second: String,
    },
    #[error("permission prefix `{0}` is declared more than once")]
    DuplicatePermissionPrefix(String),
}

/// ApiError
///
/// Errors returned by the JSON API routes, rendered as `{"error", "message", "code"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<PreferenceError> for ApiError {
    fn from(err: PreferenceError) -> Self {
        tracing::warn!("preference store error: {}", err);
        ApiError::BadGateway("Preference store unavailable".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": true,
            "message": self.to_string(),
            "code": self.error_code(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
