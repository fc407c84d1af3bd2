use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use url::Url;
use utoipa::IntoParams;

use crate::{
    AppState,
    access::ResolvedRoute,
    auth::AuthUser,
    cookies::{
        LOGIN_STATE_COOKIE, PREFERENCE_COOKIE, append_cookie, cleared_login_state_cookie,
        cookie_value, login_state_cookie, session_cookie, set_preference_cookie,
    },
    error::ApiError,
    login::{LoginExchange, issue_login_state, issue_session, verify_login_state},
    models::{LanguageRequest, LanguageResponse, LanguageSource},
    preferences::UserPreferenceStore,
};

// --- Query Structs ---

/// LoginParams
///
/// Query parameters accepted by `/auth/login`, as produced by the access gate.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginParams {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
    pub ui_locales: Option<String>,
}

/// CallbackParams
///
/// Query parameters the identity provider sends back to `/auth/callback`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

// --- Handlers ---

/// health
///
/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// login
///
/// Sends the caller to the identity provider's hosted login page. The locale is
/// forwarded as `ui_locales`. `state` is a fresh random value; it and the
/// requested `returnTo` are kept in a signed, short-lived cookie that the
/// callback checks. Only same-origin relative paths are accepted as `returnTo`.
#[utoipa::path(
    get,
    path = "/auth/login",
    params(LoginParams),
    responses((status = 307, description = "Redirect to the hosted login page"))
)]
pub async fn login(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Result<Response, ApiError> {
    let locale = state
        .routes
        .locales
        .normalize(params.ui_locales.as_deref())
        .to_string();
    let return_to = params
        .return_to
        .filter(|path| is_safe_return_path(path))
        .unwrap_or_else(|| "/".to_string());

    let config = &state.config;
    let login_state = issue_login_state(&config.session_secret, &return_to).map_err(|e| {
        tracing::error!("cannot sign login state: {}", e);
        ApiError::internal("Login is unavailable")
    })?;

    let redirect_uri = config.callback_url();
    let mut pairs = vec![
        ("response_type", "code"),
        ("client_id", config.auth0_client_id.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("scope", "openid profile email"),
        ("ui_locales", locale.as_str()),
        ("state", login_state.nonce.as_str()),
    ];
    if let Some(audience) = config.auth0_audience.as_deref() {
        pairs.push(("audience", audience));
    }

    let authorize = Url::parse_with_params(
        &format!("{}/authorize", config.auth0_base_url()),
        &pairs,
    )
    .map_err(|e| {
        tracing::error!("cannot build authorize url: {}", e);
        ApiError::internal("Identity provider is misconfigured")
    })?;

    let mut response = Redirect::temporary(authorize.as_str()).into_response();
    append_cookie(
        &mut response,
        &login_state_cookie(&login_state.cookie_token, config.secure_cookies()),
    );
    Ok(response)
}

/// callback
///
/// Completes the hosted login: checks `state` against the login state cookie,
/// exchanges the code, issues `appSession`, and returns the caller to the page
/// they originally asked for.
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackParams),
    responses(
        (status = 307, description = "Session issued, redirect to the original page"),
        (status = 400, description = "Missing or mismatched login state, or login error"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let config = &state.config;

    let return_to = cookie_value(&headers, LOGIN_STATE_COOKIE)
        .and_then(|token| {
            verify_login_state(&config.session_secret, &token, params.state.as_deref()?)
        })
        .ok_or_else(|| {
            tracing::warn!("login callback with missing or mismatched state");
            ApiError::bad_request("Login state is missing or does not match")
        })?;

    if let Some(error) = params.error {
        tracing::warn!(
            "hosted login returned {}: {}",
            error,
            params.error_description.as_deref().unwrap_or_default()
        );
        return Err(ApiError::bad_request(format!("Login was not completed: {}", error)));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let tokens = state.login.exchange(&code).await.map_err(|e| {
        tracing::warn!("authorization code exchange failed: {}", e);
        ApiError::bad_gateway("Identity provider unavailable")
    })?;
    let (session, max_age) = issue_session(&config.session_secret, &tokens).map_err(|e| {
        tracing::error!("cannot sign session: {}", e);
        ApiError::internal("Login is unavailable")
    })?;
    tracing::info!(user = %tokens.user_id, "login completed");

    let secure = config.secure_cookies();
    let mut response = Redirect::temporary(&return_to).into_response();
    append_cookie(&mut response, &session_cookie(&session, max_age, secure));
    append_cookie(&mut response, &cleared_login_state_cookie(secure));
    Ok(response)
}

fn is_safe_return_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// forbidden_page
///
/// `GET /{locale}/forbidden`, reachable directly as well as through the gate's rewrite.
pub async fn forbidden_page(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> Response {
    let locale = state.routes.locales.normalize(Some(locale.as_str())).to_string();
    forbidden_response(&locale)
}

/// The forbidden page body, served in place of the requested page.
pub fn forbidden_response(locale: &str) -> Response {
    let (title, message) = match locale {
        "fr" => (
            "Accès refusé",
            "Vous n'avez pas la permission d'accéder à cette page.",
        ),
        _ => ("Access denied", "You do not have permission to view this page."),
    };

    let body = format!(
        "<!doctype html><html lang=\"{locale}\"><head><title>{title}</title></head>\
         <body><main data-page=\"forbidden\"><h1>{title}</h1><p>{message}</p></main></body></html>"
    );
    (StatusCode::FORBIDDEN, Html(body)).into_response()
}

/// page
///
/// Fallback for every page path. Page rendering lives in the front end; this
/// placeholder only reports which route the gate resolved.
pub async fn page(resolved: Option<Extension<ResolvedRoute>>) -> Response {
    let Some(Extension(resolved)) = resolved else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(route_key) = resolved.route_key.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let body = format!(
        "<!doctype html><html lang=\"{}\"><body><main data-route-key=\"{}\"></main></body></html>",
        resolved.request_path.locale, route_key
    );
    Html(body).into_response()
}

/// get_language
///
/// [Authenticated Route] The caller's effective language: cookie first, then
/// the stored profile value, then the default locale.
#[utoipa::path(
    get,
    path = "/api/me/language",
    responses(
        (status = 200, description = "Effective language", body = LanguageResponse),
        (status = 401, description = "No session"),
        (status = 502, description = "Preference store unavailable")
    )
)]
pub async fn get_language(
    AuthUser { id }: AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LanguageResponse>, ApiError> {
    let locales = &state.routes.locales;

    if let Some(language) = cookie_value(&headers, PREFERENCE_COOKIE).filter(|l| locales.contains(l)) {
        return Ok(Json(LanguageResponse {
            language,
            source: LanguageSource::Cookie,
        }));
    }

    let stored = state.preferences.get_user_language(&id).await?;
    let response = match stored.filter(|l| locales.contains(l)) {
        Some(language) => LanguageResponse {
            language,
            source: LanguageSource::Profile,
        },
        None => LanguageResponse {
            language: locales.default_locale().to_string(),
            source: LanguageSource::Default,
        },
    };
    Ok(Json(response))
}

/// set_language
///
/// [Authenticated Route] Stores a new preferred language and sets the
/// preference cookie so the next page request uses it without a lookup.
#[utoipa::path(
    put,
    path = "/api/me/language",
    request_body = LanguageRequest,
    responses(
        (status = 200, description = "Language stored", body = LanguageResponse),
        (status = 400, description = "Unsupported language"),
        (status = 401, description = "No session"),
        (status = 502, description = "Preference store unavailable")
    )
)]
pub async fn set_language(
    AuthUser { id }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<LanguageRequest>,
) -> Result<Response, ApiError> {
    if !state.routes.locales.contains(&payload.language) {
        return Err(ApiError::bad_request(format!(
            "Unsupported language `{}`",
            payload.language
        )));
    }

    state
        .preferences
        .set_user_language(&id, &payload.language)
        .await?;
    tracing::info!(user = %id, "preferred language set to {}", payload.language);

    let mut response = Json(LanguageResponse {
        language: payload.language.clone(),
        source: LanguageSource::Profile,
    })
    .into_response();
    set_preference_cookie(&mut response, &payload.language);
    Ok(response)
}
