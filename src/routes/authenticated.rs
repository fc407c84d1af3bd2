use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`; the router layer above
/// rejects anonymous callers with 401 before the handler runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /api/me/language
        // Reads or stores the caller's preferred language. PUT also refreshes
        // the preference cookie the access gate reads on page requests.
        .route(
            "/api/me/language",
            get(handlers::get_language).put(handlers::set_language),
        )
}
