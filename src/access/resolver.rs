use std::collections::HashSet;

use url::form_urlencoded;

use super::locale::{LocalizedRequestPath, prefixed};
use super::table::{RequiredAccess, RouteTables};
use crate::auth::Session;

/// Hosted login entry point of the identity provider integration.
pub const LOGIN_PATH: &str = "/auth/login";

/// ResolvedRoute
///
/// Everything the gate knows about a request path before looking at the caller.
/// Inserted into request extensions so page handlers can read the route key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub request_path: LocalizedRequestPath,
    pub route_key: Option<String>,
    pub required: RequiredAccess,
}

impl ResolvedRoute {
    pub fn locale(&self) -> &str {
        &self.request_path.locale
    }

    /// The permission to check, only when a session exists to check it against.
    pub fn permission_to_check(&self, has_session: bool) -> Option<&str> {
        match &self.required {
            RequiredAccess::Permission(permission) if has_session => Some(permission.as_str()),
            _ => None,
        }
    }
}

/// AccessDecision
///
/// The single response action for a gated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// `return_to` is the original path (and query) the caller asked for.
    RedirectToLogin { return_to: String, locale: String },
    /// Serve the localized forbidden page without changing the visible URL.
    RewriteToForbidden { locale: String },
}

impl AccessDecision {
    /// `Location` for a login redirect.
    pub fn login_location(&self) -> Option<String> {
        match self {
            AccessDecision::RedirectToLogin { return_to, locale } => {
                Some(login_url(return_to, locale))
            }
            _ => None,
        }
    }

    /// Internal target of a forbidden rewrite.
    pub fn forbidden_target(&self) -> Option<String> {
        match self {
            AccessDecision::RewriteToForbidden { locale } => Some(format!("/{}/forbidden", locale)),
            _ => None,
        }
    }
}

/// `/auth/login?ui_locales={locale}&returnTo={return_to}`, both form-encoded.
pub fn login_url(return_to: &str, locale: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("ui_locales", locale)
        .append_pair("returnTo", return_to)
        .finish();
    format!("{}?{}", LOGIN_PATH, query)
}

impl RouteTables {
    /// Strips the locale, finds the route key, and looks up what it requires.
    pub fn resolve(&self, pathname: &str) -> ResolvedRoute {
        let request_path = self.locales.strip(pathname);
        let route_key = self
            .paths
            .resolve(&request_path.locale, &request_path.path_without_locale)
            .map(str::to_string);
        let required = self.permissions.required_access(route_key.as_deref());

        ResolvedRoute {
            request_path,
            route_key,
            required,
        }
    }
}

/// decide
///
/// Maps a resolved route and the caller's state to a decision. `granted` is the
/// caller's decoded permission set; `None` means it was not fetched or the fetch
/// failed, which a permission-gated route treats as missing permission.
pub fn decide(
    resolved: &ResolvedRoute,
    original_path: &str,
    session: Option<&Session>,
    granted: Option<&HashSet<String>>,
) -> AccessDecision {
    if resolved.required == RequiredAccess::Public {
        return AccessDecision::Allow;
    }

    if session.is_none() {
        return AccessDecision::RedirectToLogin {
            return_to: original_path.to_string(),
            locale: resolved.locale().to_string(),
        };
    }

    if let RequiredAccess::Permission(permission) = &resolved.required {
        let allowed = granted.is_some_and(|set| set.contains(permission));
        if !allowed {
            return AccessDecision::RewriteToForbidden {
                locale: resolved.locale().to_string(),
            };
        }
    }

    AccessDecision::Allow
}

/// What to do with the caller's preferred locale once access is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleAction {
    /// Serve the page and persist `locale` in the preference cookie.
    Keep { locale: String },
    /// Redirect to the page under the preferred locale and persist it.
    Redirect { location: String, locale: String },
}

/// locale_action
///
/// Unsupported or missing preferences fall back to the default locale. A
/// resolved route is redirected to its own path under the preferred locale, so
/// `/fr/a-propos` becomes `/en/about`; anything else keeps its path and only
/// swaps the prefix.
pub fn locale_action(
    tables: &RouteTables,
    resolved: &ResolvedRoute,
    preferred: Option<&str>,
    query: Option<&str>,
) -> LocaleAction {
    let preferred = tables.locales.normalize(preferred).to_string();

    if preferred == resolved.request_path.locale {
        return LocaleAction::Keep { locale: preferred };
    }

    let translated = resolved
        .route_key
        .as_deref()
        .and_then(|key| tables.paths.path_for(key, &preferred));
    let mut location = match translated {
        Some(path) => prefixed(&preferred, path),
        None => resolved.request_path.with_locale(&preferred),
    };
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        location.push('?');
        location.push_str(query);
    }

    LocaleAction::Redirect {
        location,
        locale: preferred,
    }
}
