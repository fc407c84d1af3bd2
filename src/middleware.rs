use std::collections::HashSet;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    access::{AccessDecision, LocaleAction, decide, locale_action},
    auth::{IdentityProvider, PermissionDecoder},
    cookies::{PREFERENCE_COOKIE, cookie_value, set_preference_cookie},
    handlers,
    preferences::UserPreferenceStore,
};

/// Path prefixes the gate never looks at: JSON API, build output, login flow.
const BYPASS_PREFIXES: [&str; 3] = ["/api", "/_next", "/auth"];

/// is_bypassed
///
/// API routes, framework internals, the login flow, and anything that looks
/// like a static file (a `.` in the last segment) skip the gate.
pub fn is_bypassed(path: &str) -> bool {
    let under_prefix = BYPASS_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    });
    let last_segment = path.rsplit('/').next().unwrap_or_default();

    under_prefix || last_segment.contains('.')
}

/// access_gate
///
/// Runs once per page request:
/// 1. Resolve the route key and what it requires.
/// 2. Read the session; then, concurrently, fetch permissions (only when a
///    permission must be checked) and the stored locale preference (only when
///    the cookie does not carry a supported one). Both lookups are bounded by
///    the upstream timeout; running out counts as a failed lookup.
/// 3. A login redirect or forbidden page ends the request here, so no locale
///    redirect can stack on top of it.
/// 4. Otherwise apply the locale preference: redirect, or pass through and
///    persist the cookie.
pub async fn access_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_bypassed(&path) {
        return next.run(request).await;
    }

    let original_path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let query = request.uri().query().map(str::to_string);
    let resolved = state.routes.resolve(&path);

    let session = match state.identity.get_session(request.headers()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("session lookup failed, treating caller as anonymous: {}", e);
            None
        }
    };

    let cookie_preference = cookie_value(request.headers(), PREFERENCE_COOKIE)
        .filter(|locale| state.routes.locales.contains(locale));
    let permission = resolved.permission_to_check(session.is_some());
    let headers = request.headers();
    let timeout = state.config.upstream_timeout();

    let (granted, stored_preference) = tokio::join!(
        async {
            match permission {
                Some(_) => {
                    fetch_permissions(state.identity.as_ref(), &state.permissions, headers, timeout)
                        .await
                }
                None => None,
            }
        },
        async {
            match (&session, &cookie_preference) {
                (Some(session), None) => {
                    lookup_preference(state.preferences.as_ref(), &session.user_id, timeout).await
                }
                _ => None,
            }
        }
    );

    let decision = decide(&resolved, &original_path, session.as_ref(), granted.as_ref());
    tracing::debug!(
        path = %path,
        route_key = ?resolved.route_key,
        decision = ?decision,
        "access decision"
    );

    match &decision {
        AccessDecision::RedirectToLogin { .. } => {
            let location = decision.login_location().unwrap_or_default();
            return Redirect::temporary(&location).into_response();
        }
        AccessDecision::RewriteToForbidden { locale } => {
            tracing::info!(
                path = %path,
                rewrite_to = ?decision.forbidden_target(),
                "permission missing, serving forbidden page"
            );
            return handlers::forbidden_response(locale);
        }
        AccessDecision::Allow => {}
    }

    let Some(session) = session else {
        request.extensions_mut().insert(resolved);
        return next.run(request).await;
    };

    let preferred = cookie_preference.or(stored_preference);
    let action = locale_action(
        &state.routes,
        &resolved,
        preferred.as_deref(),
        query.as_deref(),
    );

    match action {
        LocaleAction::Redirect { location, locale } => {
            tracing::debug!(user = %session.user_id, "redirecting to preferred locale {}", locale);
            let mut response = Redirect::temporary(&location).into_response();
            set_preference_cookie(&mut response, &locale);
            response
        }
        LocaleAction::Keep { locale } => {
            request.extensions_mut().insert(session);
            request.extensions_mut().insert(resolved);
            let mut response = next.run(request).await;
            set_preference_cookie(&mut response, &locale);
            response
        }
    }
}

/// Permission set of the caller, or `None` on any failure (fail closed).
async fn fetch_permissions(
    identity: &dyn IdentityProvider,
    decoder: &PermissionDecoder,
    headers: &HeaderMap,
    timeout: Duration,
) -> Option<HashSet<String>> {
    let token = match tokio::time::timeout(timeout, identity.get_access_token(headers)).await {
        Ok(Ok(token)) => token,
        Ok(Err(e)) => {
            tracing::warn!("access token unavailable: {}", e);
            return None;
        }
        Err(_) => {
            tracing::warn!("access token lookup timed out after {:?}", timeout);
            return None;
        }
    };

    match decoder.decode_permissions(&token.token) {
        Ok(permissions) => Some(permissions),
        Err(e) => {
            tracing::warn!("access token rejected: {}", e);
            None
        }
    }
}

/// Stored preference, or `None` when the store fails or is too slow (default locale applies).
async fn lookup_preference(
    store: &dyn UserPreferenceStore,
    user_id: &str,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, store.get_user_language(user_id)).await {
        Ok(Ok(language)) => language,
        Ok(Err(e)) => {
            tracing::warn!(user = %user_id, "preferred language lookup failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!(user = %user_id, "preferred language lookup timed out after {:?}", timeout);
            None
        }
    }
}
