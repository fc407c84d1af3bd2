//! Route access resolution.
//!
//! Turns a request path into a locale-independent route key, looks up what the
//! key requires, and decides between serving the page, sending the caller to
//! login, or serving the forbidden page in place.

pub mod locale;
pub mod resolver;
pub mod table;

pub use locale::{LocaleSet, LocalizedRequestPath};
pub use resolver::{AccessDecision, LocaleAction, ResolvedRoute, decide, locale_action, login_url};
pub use table::{
    LocalizedPath, LocalizedPathTable, PermissionEntry, RequiredAccess, RouteEntry,
    RoutePermissionTable, RouteTables,
};
