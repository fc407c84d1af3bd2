use axum::{
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};

/// Cookie remembering the user's preferred locale.
pub const PREFERENCE_COOKIE: &str = "user_preferred_language";
/// One year, in seconds.
pub const PREFERENCE_COOKIE_MAX_AGE: u64 = 31_536_000;
/// Short-lived cookie binding a hosted login to the browser that started it.
pub const LOGIN_STATE_COOKIE: &str = "appLoginState";
pub const LOGIN_STATE_MAX_AGE: u64 = 600;

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

pub fn preference_cookie(locale: &str) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/",
        PREFERENCE_COOKIE, locale, PREFERENCE_COOKIE_MAX_AGE
    )
}

/// Appends the preference cookie to an outgoing response.
pub fn set_preference_cookie(response: &mut Response, locale: &str) {
    append_cookie(response, &preference_cookie(locale));
}

/// `appSession`, readable only by the server.
pub fn session_cookie(token: &str, max_age: u64, secure: bool) -> String {
    http_only_cookie(crate::auth::SESSION_COOKIE, token, max_age, "/", secure)
}

/// Scoped to `/auth` so it only travels to the login callback.
pub fn login_state_cookie(token: &str, secure: bool) -> String {
    http_only_cookie(LOGIN_STATE_COOKIE, token, LOGIN_STATE_MAX_AGE, "/auth", secure)
}

pub fn cleared_login_state_cookie(secure: bool) -> String {
    http_only_cookie(LOGIN_STATE_COOKIE, "", 0, "/auth", secure)
}

fn http_only_cookie(name: &str, value: &str, max_age: u64, path: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path={}; HttpOnly; SameSite=Lax",
        name, value, max_age, path
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Appends a `Set-Cookie` header, skipping values that are not valid header text.
pub fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("refusing to set cookie: {}", e),
    }
}
