use adspace_gate::{
    AppConfig, AppState, MockIdentityProvider, MockLoginExchange, MockPreferenceStore,
    PermissionDecoder, RouteTables, auth::AccessTokenClaims, create_router,
};
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tower::util::ServiceExt;

const TOKEN_SECRET: &str = "gate-test-token-secret";
const USER_ID: &str = "auth0|64f1c0advertiser";

// --- Setup Utilities ---

fn access_token(permissions: &[&str]) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;
    let claims = AccessTokenClaims {
        sub: USER_ID.to_string(),
        exp: now + 3600,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TOKEN_SECRET.as_bytes()),
    )
    .unwrap()
}

fn app(identity: MockIdentityProvider, store: MockPreferenceStore) -> axum::Router {
    app_with_config(identity, store, AppConfig::default())
}

fn app_with_config(
    identity: MockIdentityProvider,
    store: MockPreferenceStore,
    config: AppConfig,
) -> axum::Router {
    let state = AppState {
        identity: Arc::new(identity),
        preferences: Arc::new(store),
        login: Arc::new(MockLoginExchange::unavailable()),
        routes: Arc::new(RouteTables::builtin().unwrap()),
        permissions: Arc::new(PermissionDecoder::hs256(TOKEN_SECRET, None)),
        config,
    };
    create_router(state)
}

async fn get(app: axum::Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// --- Access Decisions ---

#[tokio::test]
async fn test_anonymous_user_is_sent_to_login() {
    let app = app(MockIdentityProvider::anonymous(), MockPreferenceStore::new());

    let response = get(app, "/en/dashboard/admin/media/pending", None).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/auth/login?ui_locales=en&returnTo=%2Fen%2Fdashboard%2Fadmin%2Fmedia%2Fpending"
    );
}

#[tokio::test]
async fn test_login_redirect_keeps_query_in_return_to() {
    let app = app(MockIdentityProvider::anonymous(), MockPreferenceStore::new());

    let response = get(app, "/fr/dashboard/campaigns?page=2", None).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/auth/login?ui_locales=fr&returnTo=%2Ffr%2Fdashboard%2Fcampaigns%3Fpage%3D2"
    );
}

#[tokio::test]
async fn test_session_only_route_requires_login_but_no_permission() {
    let anonymous = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/en/dashboard",
        None,
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::TEMPORARY_REDIRECT);

    // No access token at all: the route never asks for one.
    let signed_in = get(
        app(
            MockIdentityProvider::signed_in(USER_ID, None),
            MockPreferenceStore::new(),
        ),
        "/en/dashboard",
        None,
    )
    .await;
    assert_eq!(signed_in.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_permission_serves_forbidden_page_in_place() {
    let identity = MockIdentityProvider::signed_in(USER_ID, Some(access_token(&["read:campaign"])));
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/fr/dashboard/organization/employees", None).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(body_text(response).await.contains("Accès refusé"));
}

#[tokio::test]
async fn test_granted_permission_reaches_the_page() {
    let identity =
        MockIdentityProvider::signed_in(USER_ID, Some(access_token(&["read:employees"])));
    let store = MockPreferenceStore::with_language(USER_ID, "en");

    let response = get(app(identity, store), "/en/dashboard/organization/employees", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("data-route-key=\"/dashboard/organization/employees\"")
    );
}

#[tokio::test]
async fn test_longest_prefix_decides_required_permission() {
    // `/dashboard/admin` grants nothing under `/dashboard/admin/media`.
    let identity = MockIdentityProvider::signed_in(USER_ID, Some(access_token(&["read:admin"])));
    let response = get(
        app(identity, MockPreferenceStore::new()),
        "/en/dashboard/admin/media/pending",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let identity =
        MockIdentityProvider::signed_in(USER_ID, Some(access_token(&["update:verification"])));
    let response = get(
        app(identity, MockPreferenceStore::new()),
        "/en/dashboard/admin/media/pending",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_failures_fail_closed() {
    let unreachable = MockIdentityProvider {
        fail_token_fetch: true,
        ..MockIdentityProvider::signed_in(USER_ID, None)
    };
    let response = get(
        app(unreachable, MockPreferenceStore::new()),
        "/en/dashboard/payments",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let garbage = MockIdentityProvider::signed_in(USER_ID, Some("not-a-jwt".to_string()));
    let response = get(
        app(garbage, MockPreferenceStore::new()),
        "/en/dashboard/payments",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_localized_path_resolves_under_its_locale() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/fr/dashboard/profil", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("data-route-key=\"/dashboard/profile\"")
    );
}

#[tokio::test]
async fn test_unknown_route_is_allowed_then_not_found() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/en/nowhere",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Locale Preference ---

#[tokio::test]
async fn test_preferred_locale_redirects_public_page() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/en/browse", None).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/fr/browse");
    assert!(
        set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("user_preferred_language=fr;") && c.contains("Max-Age=31536000"))
    );
}

#[tokio::test]
async fn test_locale_redirect_preserves_query_and_root() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let response = get(
        app(identity.clone(), MockPreferenceStore::with_language(USER_ID, "fr")),
        "/en/browse?city=lyon&size=large",
        None,
    )
    .await;
    assert_eq!(location(&response), "/fr/browse?city=lyon&size=large");

    let response = get(
        app(identity, MockPreferenceStore::with_language(USER_ID, "fr")),
        "/en",
        None,
    )
    .await;
    assert_eq!(location(&response), "/fr");
}

#[tokio::test]
async fn test_matching_locale_persists_cookie_without_redirect() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/fr/browse", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        set_cookies(&response),
        vec!["user_preferred_language=fr; Max-Age=31536000; Path=/".to_string()]
    );
}

#[tokio::test]
async fn test_cookie_preference_wins_over_stored_value() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "en");

    let response = get(
        app(identity, store),
        "/en/browse",
        Some("user_preferred_language=fr"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/fr/browse");
}

#[tokio::test]
async fn test_failing_store_falls_back_to_default_locale() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);

    let response = get(
        app(identity, MockPreferenceStore::new_failing()),
        "/en/browse",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        set_cookies(&response),
        vec!["user_preferred_language=en; Max-Age=31536000; Path=/".to_string()]
    );
}

#[tokio::test]
async fn test_forbidden_suppresses_locale_redirect() {
    // Preference says `fr`, path says `en`, and the permission is missing:
    // exactly one action, the forbidden page.
    let identity = MockIdentityProvider::signed_in(USER_ID, Some(access_token(&[])));
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/en/dashboard/reservations", None).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_login_redirect_suppresses_locale_redirect() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/en/dashboard/campaigns",
        Some("user_preferred_language=fr"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&response).starts_with("/auth/login?ui_locales=en&"));
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_anonymous_public_page_is_left_alone() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/fr/browse",
        Some("user_preferred_language=en"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
}

// --- Bypass & Public Endpoints ---

#[tokio::test]
async fn test_health_check_bypasses_gate() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/api/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_static_assets_bypass_gate() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(app(identity, store), "/en/dashboard/admin/logo.png", None).await;

    // Not redirected to `fr`, not forbidden: the gate never ran.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_forbidden_page_is_directly_reachable() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/fr/forbidden",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("lang=\"fr\""));
}

#[tokio::test]
async fn test_login_forwards_to_hosted_login() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/auth/login?ui_locales=fr&returnTo=%2Ffr%2Fdashboard%2Fpayments",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let target = location(&response);
    assert!(target.starts_with("https://marketplace-dev.eu.auth0.com/authorize?"));
    assert!(target.contains("client_id=local-client-id"));
    assert!(target.contains("ui_locales=fr"));
    assert!(target.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
    // The return path stays server-side; `state` is an opaque value.
    assert!(!target.contains("dashboard"));
    assert!(
        set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("appLoginState=") && c.contains("HttpOnly"))
    );
}

#[tokio::test]
async fn test_login_normalizes_unsupported_locale() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/auth/login?ui_locales=de&returnTo=%2F%2Fevil.example",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&response).contains("ui_locales=en"));
}

// --- Localized Paths & Slow Upstreams ---

#[tokio::test]
async fn test_locale_redirect_follows_translated_path() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);

    let response = get(
        app(identity.clone(), MockPreferenceStore::with_language(USER_ID, "en")),
        "/fr/dashboard/profil",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/en/dashboard/profile");

    let followed = get(
        app(identity, MockPreferenceStore::with_language(USER_ID, "en")),
        "/en/dashboard/profile",
        Some("user_preferred_language=en"),
    )
    .await;
    assert_eq!(followed.status(), StatusCode::OK);
    assert!(
        body_text(followed)
            .await
            .contains("data-route-key=\"/dashboard/profile\"")
    );
}

#[tokio::test]
async fn test_unsupported_cookie_defers_to_stored_preference() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let store = MockPreferenceStore::with_language(USER_ID, "fr");

    let response = get(
        app(identity, store),
        "/en/about",
        Some("user_preferred_language=de"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/fr/a-propos");
    assert!(
        set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("user_preferred_language=fr;"))
    );
}

#[tokio::test]
async fn test_trailing_slash_is_gated_like_the_route() {
    let response = get(
        app(MockIdentityProvider::anonymous(), MockPreferenceStore::new()),
        "/en/dashboard/admin/",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&response).starts_with("/auth/login?ui_locales=en&"));

    let identity = MockIdentityProvider::signed_in(USER_ID, Some(access_token(&["read:campaign"])));
    let response = get(
        app(identity, MockPreferenceStore::new()),
        "/en/dashboard/admin/",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn fast_upstream_config() -> AppConfig {
    AppConfig {
        upstream_timeout_ms: 50,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_stalled_preference_store_falls_back_to_default_locale() {
    let identity = MockIdentityProvider::signed_in(USER_ID, None);
    let app = app_with_config(identity, MockPreferenceStore::new_stalled(), fast_upstream_config());

    let response = tokio::time::timeout(Duration::from_secs(2), get(app, "/fr/browse", None))
        .await
        .expect("gate waited on a stalled preference store");

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/en/browse");
}

#[tokio::test]
async fn test_stalled_token_lookup_fails_closed() {
    let identity = MockIdentityProvider {
        stall_token_fetch: true,
        ..MockIdentityProvider::signed_in(USER_ID, Some(access_token(&["read:payment"])))
    };
    let app = app_with_config(identity, MockPreferenceStore::new(), fast_upstream_config());

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        get(app, "/en/dashboard/payments", None),
    )
    .await
    .expect("gate waited on a stalled token lookup");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
