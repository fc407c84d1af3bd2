/// Router Module Index
///
/// Splits the JSON and login endpoints by who may call them. Page paths are not
/// listed here: they fall through to `handlers::page` behind the access gate.

/// Routes any caller may reach: health, the login redirect, the forbidden page.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware.
pub mod authenticated;
