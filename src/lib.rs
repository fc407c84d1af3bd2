use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{Next, from_fn_with_state},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Route resolution and access decisions (pure, no I/O).
pub mod access;
// Identity, preferences, and the Management API token.
pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
// Hosted login: state cookie, code exchange, session issuing.
pub mod login;
pub mod middleware;
pub mod models;
pub mod preferences;
pub mod token_cache;

// Module for routing segregation (Public, Authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use access::RouteTables;
pub use auth::{IdentityState, MockIdentityProvider, PermissionDecoder, SessionCookieProvider};
pub use config::AppConfig;
pub use login::{AuthorizationCodeExchange, LoginExchangeState, MockLoginExchange};
pub use preferences::{ManagementApiStore, MockPreferenceStore, PreferenceState};

/// ApiDoc
///
/// OpenAPI document for the JSON and login endpoints, served at `/api/openapi.json`.
/// Page paths are handled by the gate and the fallback and are not listed.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::login, handlers::callback, handlers::get_language,
        handlers::set_language
    ),
    components(schemas(models::LanguageRequest, models::LanguageResponse, models::LanguageSource)),
    tags((name = "adspace-gate", description = "Marketplace access gate"))
)]
pub struct ApiDoc;

/// AppState
///
/// Shared by every request: the identity provider, the preference store, the
/// login exchange, the route tables (read-only after startup), the access
/// token verifier, and the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    /// Reads the session and the caller's access token.
    pub identity: IdentityState,
    /// Stored language preferences.
    pub preferences: PreferenceState,
    /// Completes hosted logins at `/auth/callback`.
    pub login: LoginExchangeState,
    pub routes: Arc<RouteTables>,
    pub permissions: Arc<PermissionDecoder>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for PreferenceState {
    fn from_ref(app_state: &AppState) -> PreferenceState {
        app_state.preferences.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects anonymous callers of the authenticated API routes with 401 before
/// the handler runs; `AuthUser` does the work as an extractor.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the API routes, the page fallback, the access gate, and the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Every other path is a page.
        .fallback(handlers::page)
        // The gate sees every request; it skips API, asset, and login paths itself.
        .layer(from_fn_with_state(state.clone(), middleware::access_gate))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span carrying method, URI, and `x-request-id`, so
/// gate decisions and upstream failures log under the same request id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
