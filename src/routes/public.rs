use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a session. `/api/*` and `/auth/*` are skipped
/// by the access gate; `/{locale}/forbidden` goes through it and resolves to a
/// public route.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /api/health
        // Liveness probe for the load balancer. Lives under /api so the gate
        // never redirects it to a locale.
        .route("/api/health", get(handlers::health))
        // GET /auth/login?returnTo=...&ui_locales=...
        // Target of the gate's login redirect; forwards to the hosted login page.
        .route("/auth/login", get(handlers::login))
        // GET /auth/callback?code=...&state=...
        // Where the hosted login returns; issues the session cookie.
        .route("/auth/callback", get(handlers::callback))
        // GET /{locale}/forbidden
        // The page served when a signed-in user lacks the route's permission.
        .route("/{locale}/forbidden", get(handlers::forbidden_page))
}
